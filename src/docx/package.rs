use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::ContainerError;

/// A `.docx` zip container held in memory, entries in archive order.
pub struct Container {
    pub entries: Vec<ContainerEntry>,
}

pub struct ContainerEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

impl Container {
    /// Reads every entry to the end, so a CRC mismatch surfaces here.
    pub fn read(bytes: &[u8]) -> Result<Self, ContainerError> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))?;
        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let mut file = zip.by_index(i)?;
            let name = file.name().to_string();
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)
                .map_err(|source| ContainerError::Entry {
                    name: name.clone(),
                    source,
                })?;
            entries.push(ContainerEntry {
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
                name,
                data,
            });
        }
        Ok(Self { entries })
    }

    pub fn entry(&self, name: &str) -> Option<&ContainerEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn xml_entries(&self) -> impl Iterator<Item = &ContainerEntry> {
        self.entries
            .iter()
            .filter(|e| !e.is_dir && e.name.to_ascii_lowercase().ends_with(".xml"))
    }
}

/// Every entry of the archive, by path.
pub fn unpack(bytes: &[u8]) -> Result<BTreeMap<String, Vec<u8>>, ContainerError> {
    let container = Container::read(bytes)?;
    Ok(container
        .entries
        .into_iter()
        .map(|e| (e.name, e.data))
        .collect())
}

/// Rebuilds `original` with the entries named in `modified` replaced.
///
/// The original entry list drives the output: order is kept, nothing is added,
/// replaced entries reuse the original compression method, timestamp and
/// permissions, and every other entry is raw-copied without recompression.
pub fn repack(
    original: &[u8],
    modified: &BTreeMap<String, Vec<u8>>,
) -> Result<Vec<u8>, ContainerError> {
    let mut zin = ZipArchive::new(Cursor::new(original))?;
    let mut zout = ZipWriter::new(Cursor::new(Vec::with_capacity(original.len())));
    let mut replaced = 0usize;

    for i in 0..zin.len() {
        let file = zin.by_index_raw(i)?;
        let Some(data) = modified.get(file.name()) else {
            zout.raw_copy_file(file)?;
            continue;
        };
        let name = file.name().to_string();
        let mut opts = SimpleFileOptions::default()
            .compression_method(file.compression())
            .last_modified_time(file.last_modified().unwrap_or_default());
        if let Some(mode) = file.unix_mode() {
            opts = opts.unix_permissions(mode);
        }
        drop(file);

        zout.start_file(name.as_str(), opts)?;
        zout.write_all(data)
            .map_err(|source| ContainerError::Write {
                name: name.clone(),
                source,
            })?;
        replaced += 1;
    }

    if replaced != modified.len() {
        debug!(
            requested = modified.len(),
            replaced, "repack ignored parts that are not in the original archive"
        );
    }

    Ok(zout.finish()?.into_inner())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds an in-memory archive; `true` entries are deflated, others stored.
    pub(crate) fn build_zip(entries: &[(&str, &[u8], bool)]) -> Vec<u8> {
        let mut zout = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data, deflate) in entries {
            let method = if *deflate {
                CompressionMethod::Deflated
            } else {
                CompressionMethod::Stored
            };
            let opts = SimpleFileOptions::default().compression_method(method);
            zout.start_file(*name, opts).expect("start file");
            zout.write_all(data).expect("write");
        }
        zout.finish().expect("finish").into_inner()
    }

    fn raw_entry(bytes: &[u8], name: &str) -> (Vec<u8>, CompressionMethod, u32) {
        let mut zip = ZipArchive::new(Cursor::new(bytes)).expect("zip");
        for i in 0..zip.len() {
            let mut file = zip.by_index_raw(i).expect("entry");
            if file.name() != name {
                continue;
            }
            let mut raw = Vec::new();
            file.read_to_end(&mut raw).expect("read raw");
            return (raw, file.compression(), file.crc32());
        }
        panic!("missing entry {name}");
    }

    #[test]
    fn unpack_reads_every_entry() {
        let bytes = build_zip(&[
            ("[Content_Types].xml", b"<Types/>", true),
            ("word/media/image1.png", b"\x89PNG", false),
        ]);
        let parts = unpack(&bytes).expect("unpack");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts["word/media/image1.png"], b"\x89PNG");
    }

    #[test]
    fn unpack_rejects_garbage() {
        assert!(matches!(
            unpack(b"definitely not a zip"),
            Err(ContainerError::Archive(_))
        ));
    }

    #[test]
    fn repack_keeps_untouched_entries_byte_identical() {
        let styles = b"<w:styles>lots of style text lots of style text</w:styles>".repeat(8);
        let bytes = build_zip(&[
            ("word/document.xml", b"<w:document/>", true),
            ("word/styles.xml", &styles, true),
            ("word/media/image1.png", b"\x89PNG\r\n\x1a\n", false),
        ]);
        let mut modified = BTreeMap::new();
        modified.insert("word/document.xml".to_string(), b"<w:document>x</w:document>".to_vec());

        let out = repack(&bytes, &modified).expect("repack");

        for name in ["word/styles.xml", "word/media/image1.png"] {
            assert_eq!(raw_entry(&bytes, name), raw_entry(&out, name), "{name}");
        }
        let (_, method, _) = raw_entry(&out, "word/document.xml");
        assert_eq!(method, CompressionMethod::Deflated);
        assert_eq!(
            unpack(&out).expect("unpack")["word/document.xml"],
            b"<w:document>x</w:document>"
        );
    }

    #[test]
    fn repack_preserves_order_and_never_adds_entries() {
        let bytes = build_zip(&[
            ("b.xml", b"<b/>", true),
            ("a.xml", b"<a/>", false),
        ]);
        let mut modified = BTreeMap::new();
        modified.insert("a.xml".to_string(), b"<a>1</a>".to_vec());
        modified.insert("new.xml".to_string(), b"<n/>".to_vec());

        let out = repack(&bytes, &modified).expect("repack");
        let container = Container::read(&out).expect("read");
        let names: Vec<&str> = container.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["b.xml", "a.xml"]);
        assert_eq!(container.entries[1].compression, CompressionMethod::Stored);
    }
}
