//! Content-based artifact classification.
//!
//! Detection is driven by magic-byte signatures, never by filename or
//! extension: uploaded artifacts carry attacker-controlled names. The
//! classifier fails soft — on any detection failure it returns
//! `ArtifactKind::Unknown` and the orchestrator scans the artifact as a
//! plain file.

use std::path::Path;
use tracing::{debug, warn};

use crate::core::ArtifactKind;

pub fn classify(path: &Path) -> ArtifactKind {
    let kind = match infer::get_from_path(path) {
        Ok(Some(found)) => match found.mime_type() {
            "application/gzip" => ArtifactKind::ArchiveGzip,
            "application/x-tar" => ArtifactKind::ArchiveTar,
            "application/zip" => ArtifactKind::ArchiveZip,
            _ => ArtifactKind::PlainFile,
        },
        Ok(None) => ArtifactKind::PlainFile,
        Err(err) => {
            warn!("Content sniffing failed for {}: {}", path.display(), err);
            ArtifactKind::Unknown
        }
    };
    debug!("Classified {} as {:?}", path.display(), kind);
    kind
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs::File;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    #[test]
    fn test_classifies_gzip_by_content() {
        let dir = tempfile::tempdir().unwrap();
        // Deliberately misleading extension: content wins.
        let path = dir.path().join("archive.txt");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(b"payload").unwrap();
        encoder.finish().unwrap();

        assert_eq!(classify(&path), ArtifactKind::ArchiveGzip);
    }

    #[test]
    fn test_classifies_zip_by_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle");
        let mut writer = ZipWriter::new(File::create(&path).unwrap());
        writer
            .start_file("inner.txt", FileOptions::default())
            .unwrap();
        writer.write_all(b"payload").unwrap();
        writer.finish().unwrap();

        assert_eq!(classify(&path), ArtifactKind::ArchiveZip);
    }

    #[test]
    fn test_classifies_tar_by_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.tar");
        let mut builder = tar::Builder::new(File::create(&path).unwrap());
        let mut header = tar::Header::new_ustar();
        header.set_size(7);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "inner.txt", &b"payload"[..])
            .unwrap();
        builder.finish().unwrap();

        assert_eq!(classify(&path), ArtifactKind::ArchiveTar);
    }

    #[test]
    fn test_plain_text_is_not_an_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.tar");
        std::fs::write(&path, "just text, despite the extension").unwrap();

        assert_eq!(classify(&path), ArtifactKind::PlainFile);
    }

    #[test]
    fn test_missing_file_degrades_to_unknown() {
        assert_eq!(
            classify(Path::new("/nonexistent/artifact")),
            ArtifactKind::Unknown
        );
    }
}
