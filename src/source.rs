use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::info;
use zip::ZipArchive;

use crate::error::PipelineError;

/// Turns a document on disk into plain text.
pub trait DocumentSource {
    fn extract(&self, path: &Path) -> Result<String>;
}

/// Dispatches on file extension: plain text, Markdown, or Word `.docx`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSource;

impl DocumentSource for FileSource {
    fn extract(&self, path: &Path) -> Result<String> {
        if !path.exists() {
            return Err(PipelineError::MissingInput(path.to_path_buf()).into());
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let text = match ext.as_str() {
            "txt" | "md" => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                String::from_utf8_lossy(&bytes).into_owned()
            }
            "docx" => read_docx(path)?,
            other => {
                let shown = if other.is_empty() { "(none)" } else { other };
                return Err(PipelineError::UnsupportedFormat(shown.to_string()).into());
            }
        };

        info!(path = %path.display(), chars = text.len(), "Document loaded");
        Ok(text)
    }
}

fn read_docx(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("Not a valid .docx container: {}", path.display()))?;
    let mut entry = archive
        .by_name("word/document.xml")
        .with_context(|| format!("No word/document.xml in {}", path.display()))?;

    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .with_context(|| format!("Failed to read word/document.xml from {}", path.display()))?;
    document_xml_to_text(&xml)
}

/// `w:t` runs concatenated; each `w:p` ends a line, `w:tab` is a tab, `w:br` a line break.
pub fn document_xml_to_text(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    let mut in_text = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"t" => in_text = true,
                b"tab" => out.push('\t'),
                b"br" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => out.push('\t'),
                b"br" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => {
                out.push_str(&e.unescape()?);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DOCUMENT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:body>
<w:p><w:r><w:t>FEUERPFEIL</w:t></w:r></w:p>
<w:p><w:r><w:t>Zaubertrick der </w:t></w:r><w:r><w:t>Hervorrufung</w:t></w:r></w:p>
<w:p><w:r><w:t>Beil</w:t><w:tab/><w:t>1 kg</w:t><w:br/><w:t>Tom &amp; Jerry</w:t></w:r></w:p>
</w:body>
</w:document>"#;

    #[test]
    fn paragraphs_tabs_and_breaks() {
        let text = document_xml_to_text(DOCUMENT_XML).unwrap();
        assert_eq!(
            text,
            "FEUERPFEIL\nZaubertrick der Hervorrufung\nBeil\t1 kg\nTom & Jerry\n"
        );
    }

    #[test]
    fn reads_docx_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regeln.docx");
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(DOCUMENT_XML.as_bytes()).unwrap();
        zip.finish().unwrap();

        let text = FileSource.extract(&path).unwrap();
        assert!(text.starts_with("FEUERPFEIL\n"));
    }

    #[test]
    fn plain_text_is_read_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regeln.txt");
        std::fs::write(&path, b"Seil\xff 5 GM").unwrap();
        assert_eq!(FileSource.extract(&path).unwrap(), "Seil\u{FFFD} 5 GM");
    }

    #[test]
    fn unsupported_and_missing_inputs_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("regeln.pdf");
        std::fs::write(&pdf, b"%PDF").unwrap();
        let err = FileSource.extract(&pdf).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::UnsupportedFormat(ext)) if ext == "pdf"
        ));

        let err = FileSource.extract(&dir.path().join("fehlt.txt")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MissingInput(_))
        ));
    }
}
