//! On-screen text recognition with the Tesseract CLI.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use vidmeta_models::OcrCaption;

use crate::command::run_tool;
use crate::error::{MediaError, MediaResult};
use crate::providers::TextRecognizer;

/// Text recognizer backed by `tesseract <image> stdout tsv`.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    language: String,
    timeout: Option<Duration>,
}

impl Default for TesseractRecognizer {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl TesseractRecognizer {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    async fn recognize(&self, image_path: &Path) -> MediaResult<Vec<OcrCaption>> {
        if !image_path.exists() {
            return Err(MediaError::FileNotFound(image_path.to_path_buf()));
        }

        let args = vec![
            image_path.to_string_lossy().to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            self.language.clone(),
            "tsv".to_string(),
        ];
        let output = run_tool("tesseract", &args, self.timeout).await?;
        let captions = parse_tesseract_tsv(&output.stdout);

        debug!(
            image = %image_path.display(),
            lines = captions.len(),
            "OCR finished"
        );
        Ok(captions)
    }

    fn name(&self) -> &'static str {
        "tesseract"
    }
}

// TSV columns: level page_num block_num par_num line_num word_num
//              left top width height conf text
const COL_PAGE: usize = 1;
const COL_BLOCK: usize = 2;
const COL_PAR: usize = 3;
const COL_LINE: usize = 4;
const COL_CONF: usize = 10;
const COL_TEXT: usize = 11;

/// Group Tesseract TSV word rows into lines with averaged confidence (0-1).
pub fn parse_tesseract_tsv(tsv: &str) -> Vec<OcrCaption> {
    let mut lines: BTreeMap<(u32, u32, u32, u32), (Vec<String>, Vec<f64>)> = BTreeMap::new();

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() <= COL_TEXT {
            continue;
        }
        let text = cols[COL_TEXT].trim();
        let Ok(conf) = cols[COL_CONF].trim().parse::<f64>() else {
            continue;
        };
        // Structural rows carry conf -1 and no text.
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        let key = |idx: usize| cols[idx].trim().parse::<u32>().unwrap_or(0);
        let entry = lines
            .entry((key(COL_PAGE), key(COL_BLOCK), key(COL_PAR), key(COL_LINE)))
            .or_default();
        entry.0.push(text.to_string());
        entry.1.push(conf);
    }

    lines
        .into_values()
        .map(|(words, confs)| {
            let mean = confs.iter().sum::<f64>() / confs.len() as f64;
            OcrCaption {
                text: words.join(" "),
                confidence: (mean / 100.0).clamp(0.0, 1.0),
            }
        })
        .collect()
}
