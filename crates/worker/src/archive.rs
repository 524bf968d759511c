//! Batch download archives.
//!
//! Each generated archive is unpacked and its entries copied under one
//! folder per schema. Items that fail leave a `<schemaId>-error.txt` marker
//! at the archive root instead. Every path written is unique: a schema that
//! fails twice gets `<schemaId>-error-2.txt` for the second marker.

use std::collections::HashSet;
use std::io::{Cursor, Read, Write};

use specforge_core::types::SchemaId;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

/// One file extracted from a generated archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub data: Vec<u8>,
}

/// Folder name for a schema: its title with every non-alphanumeric ASCII
/// character replaced by `-`, or the schema id when there is no title.
pub fn folder_name(title: Option<&str>, schema_id: SchemaId) -> String {
    match title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => title
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect(),
        None => schema_id.to_string(),
    }
}

/// Size caps applied while unpacking a generated archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadLimits {
    /// Largest single uncompressed entry, in bytes.
    pub entry: u64,
    /// Largest sum of all uncompressed entries, in bytes.
    pub total: u64,
}

impl Default for ReadLimits {
    fn default() -> Self {
        Self {
            entry: 64 * 1024 * 1024,
            total: 256 * 1024 * 1024,
        }
    }
}

const ENTRY_TOO_LARGE: &str = "archive entry exceeds the size limit";
const ARCHIVE_TOO_LARGE: &str = "archive exceeds the total size limit";

/// Read every file entry of a zip archive into memory, within the default
/// [`ReadLimits`].
pub fn read_entries(bytes: &[u8]) -> Result<Vec<ArchiveEntry>, ZipError> {
    read_entries_within(bytes, ReadLimits::default())
}

/// Read every file entry of a zip archive into memory.
///
/// Directory entries are skipped, as are entries whose path would escape
/// the archive root. Sizes declared in entry headers are only used to
/// reject early; the bytes actually read are capped independently.
pub fn read_entries_within(
    bytes: &[u8],
    limits: ReadLimits,
) -> Result<Vec<ArchiveEntry>, ZipError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut entries = Vec::new();
    let mut total = 0u64;
    for i in 0..archive.len() {
        let file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        if file.enclosed_name().is_none() {
            tracing::warn!(entry = file.name(), "Skipping archive entry with unsafe path");
            continue;
        }
        if file.size() > limits.entry {
            return Err(ZipError::UnsupportedArchive(ENTRY_TOO_LARGE));
        }
        let name = file.name().to_string();
        let mut data = Vec::new();
        let read = file.take(limits.entry + 1).read_to_end(&mut data)? as u64;
        if read > limits.entry {
            return Err(ZipError::UnsupportedArchive(ENTRY_TOO_LARGE));
        }
        total += read;
        if total > limits.total {
            return Err(ZipError::UnsupportedArchive(ARCHIVE_TOO_LARGE));
        }
        entries.push(ArchiveEntry { name, data });
    }
    Ok(entries)
}

/// In-memory zip assembled one schema at a time.
pub struct BatchArchive {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    folders: HashSet<String>,
    /// Every path already written.
    paths: HashSet<String>,
}

impl Default for BatchArchive {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchArchive {
    pub fn new() -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            folders: HashSet::new(),
            paths: HashSet::new(),
        }
    }

    /// Claim a folder for `schema_id`. Two schemas with the same title get
    /// distinct folders; the later one has `-<schemaId>` appended, and a
    /// numeric suffix after that if the same schema appears again.
    pub fn claim_folder(&mut self, title: Option<&str>, schema_id: SchemaId) -> String {
        let name = folder_name(title, schema_id);
        if self.folders.insert(name.clone()) {
            return name;
        }
        let base = format!("{name}-{schema_id}");
        let mut candidate = base.clone();
        let mut n = 2;
        while !self.folders.insert(candidate.clone()) {
            candidate = format!("{base}-{n}");
            n += 1;
        }
        candidate
    }

    /// Copy `entries` under `folder`. Entries whose path was already
    /// written are skipped.
    pub fn add_entries(&mut self, folder: &str, entries: &[ArchiveEntry]) -> Result<(), ZipError> {
        for entry in entries {
            let path = format!("{folder}/{}", entry.name);
            if !self.paths.insert(path.clone()) {
                tracing::warn!(path = %path, "Skipping duplicate archive entry");
                continue;
            }
            self.writer.start_file(path, SimpleFileOptions::default())?;
            self.writer.write_all(&entry.data)?;
        }
        Ok(())
    }

    /// Add a failure marker for `schema_id`. Returns the marker's path.
    pub fn add_error(&mut self, schema_id: SchemaId, message: &str) -> Result<String, ZipError> {
        let mut path = format!("{schema_id}-error.txt");
        let mut n = 2;
        while !self.paths.insert(path.clone()) {
            path = format!("{schema_id}-error-{n}.txt");
            n += 1;
        }
        self.writer
            .start_file(path.as_str(), SimpleFileOptions::default())?;
        self.writer
            .write_all(format!("Generation failed: {message}").as_bytes())?;
        Ok(path)
    }

    pub fn finish(self) -> Result<Vec<u8>, ZipError> {
        Ok(self.writer.finish()?.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zip_of(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in files {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn names(bytes: &[u8]) -> Vec<String> {
        let mut names: Vec<String> = read_entries(bytes)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        names.sort();
        names
    }

    // -- Folder names --------------------------------------------------------

    #[test]
    fn title_is_sanitized() {
        let id = uuid::Uuid::nil();
        assert_eq!(folder_name(Some("Pet Store v2.0"), id), "Pet-Store-v2-0");
        assert_eq!(folder_name(Some("Café"), id), "Caf-");
    }

    #[test]
    fn missing_title_uses_id() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(folder_name(None, id), id.to_string());
        assert_eq!(folder_name(Some("  "), id), id.to_string());
    }

    #[test]
    fn duplicate_titles_get_distinct_folders() {
        let mut archive = BatchArchive::new();
        let (a, b) = (uuid::Uuid::new_v4(), uuid::Uuid::new_v4());
        assert_eq!(archive.claim_folder(Some("Pets"), a), "Pets");
        assert_eq!(archive.claim_folder(Some("Pets"), b), format!("Pets-{b}"));
    }

    // -- Assembly ------------------------------------------------------------

    #[test]
    fn entries_land_under_folder() {
        let generated = zip_of(&[("index.ts", "export {}"), ("models/pet.ts", "type Pet = {}")]);
        let entries = read_entries(&generated).unwrap();

        let mut archive = BatchArchive::new();
        let folder = archive.claim_folder(Some("Pets"), uuid::Uuid::nil());
        archive.add_entries(&folder, &entries).unwrap();
        let bytes = archive.finish().unwrap();

        assert_eq!(names(&bytes), vec!["Pets/index.ts", "Pets/models/pet.ts"]);
    }

    #[test]
    fn error_marker_content() {
        let id = uuid::Uuid::new_v4();
        let mut archive = BatchArchive::new();
        archive.add_error(id, "Schema not found").unwrap();
        let bytes = archive.finish().unwrap();

        let entries = read_entries(&bytes).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, format!("{id}-error.txt"));
        assert_eq!(
            String::from_utf8(entries[0].data.clone()).unwrap(),
            "Generation failed: Schema not found"
        );
    }

    #[test]
    fn repeated_failures_get_distinct_markers() {
        let id = uuid::Uuid::new_v4();
        let mut archive = BatchArchive::new();
        assert_eq!(archive.add_error(id, "Schema not found").unwrap(), format!("{id}-error.txt"));
        assert_eq!(
            archive.add_error(id, "Schema not found").unwrap(),
            format!("{id}-error-2.txt")
        );
        let bytes = archive.finish().unwrap();

        let mut expected = vec![format!("{id}-error-2.txt"), format!("{id}-error.txt")];
        expected.sort();
        assert_eq!(names(&bytes), expected);
    }

    #[test]
    fn same_schema_twice_gets_a_third_folder() {
        let mut archive = BatchArchive::new();
        let id = uuid::Uuid::new_v4();
        assert_eq!(archive.claim_folder(Some("Pets"), id), "Pets");
        assert_eq!(archive.claim_folder(Some("Pets"), id), format!("Pets-{id}"));
        assert_eq!(archive.claim_folder(Some("Pets"), id), format!("Pets-{id}-2"));
    }

    #[test]
    fn duplicate_entry_paths_are_skipped() {
        let entries = vec![
            ArchiveEntry { name: "index.ts".into(), data: b"a".to_vec() },
            ArchiveEntry { name: "index.ts".into(), data: b"b".to_vec() },
        ];
        let mut archive = BatchArchive::new();
        archive.add_entries("Pets", &entries).unwrap();
        let bytes = archive.finish().unwrap();

        let read = read_entries(&bytes).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].data, b"a");
    }

    // -- Size limits ---------------------------------------------------------

    #[test]
    fn oversized_entry_is_rejected() {
        let big = "x".repeat(100);
        let bytes = zip_of(&[("big.txt", big.as_str())]);
        let limits = ReadLimits { entry: 10, total: 1_000 };
        assert!(read_entries_within(&bytes, limits).is_err());
    }

    #[test]
    fn total_size_is_capped() {
        let bytes = zip_of(&[("a.txt", "12345678"), ("b.txt", "12345678")]);
        assert!(read_entries_within(&bytes, ReadLimits { entry: 10, total: 12 }).is_err());
        assert_eq!(
            read_entries_within(&bytes, ReadLimits { entry: 10, total: 16 }).unwrap().len(),
            2
        );
    }

    #[test]
    fn inflated_size_header_is_rejected_without_allocating() {
        let mut bytes = zip_of(&[("index.ts", "export {}")]);
        // Uncompressed size lives 24 bytes into the central directory header.
        let central = bytes
            .windows(4)
            .position(|w| w == b"PK\x01\x02".as_slice())
            .unwrap();
        bytes[central + 24..central + 28].copy_from_slice(&(u32::MAX - 1).to_le_bytes());

        assert!(read_entries(&bytes).is_err());
    }

    #[test]
    fn garbage_is_not_an_archive() {
        assert!(read_entries(b"definitely not a zip").is_err());
    }
}
