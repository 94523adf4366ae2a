//! # Parameter files
//!
//! Reads and writes matcher parameter records as a flat tagged document, in the layout OpenCV's
//! `StereoMatcher::write` produces. YAML, XML and JSON are supported, chosen by file extension.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::*;
use crate::params::{available_fields, AlgorithmKind, FieldId, MatcherParameters};

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

const YAML_HEADER: &str = "%YAML:1.0\n---\n";
const XML_HEADER: &str = "<?xml version=\"1.0\"?>\n";
const XML_ROOT: &str = "opencv_storage";

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamFormat {
    Yaml,
    Xml,
    Json
}

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// On-disk form of a parameter record. Only the fields of the tagged kind are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamDocument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_size: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_disparity: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_disparities: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disp12_max_diff: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speckle_range: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speckle_window_size: Option<i32>,
    #[serde(rename = "P1", default, skip_serializing_if = "Option::is_none")]
    pub p1: Option<i32>,
    #[serde(rename = "P2", default, skip_serializing_if = "Option::is_none")]
    pub p2: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_filter_cap: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_filter_size: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uniqueness_ratio: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture_threshold: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_filter_type: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<i32>
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Read and check a parameter file. Nothing is applied here.
pub fn read_params<P: AsRef<Path>>(path: P) -> Result<ParamDocument> {
    let path = path.as_ref();
    let format = ParamFormat::from_path(path)?;
    let text = fs::read_to_string(path)?;

    let doc = ParamDocument::parse(&text, format)?;
    doc.kind()?;

    Ok(doc)
}

/// Write the fields of `params`' kind. The extension is checked before anything touches disk.
pub fn write_params<P: AsRef<Path>>(path: P, params: &MatcherParameters) -> Result<()> {
    let path = path.as_ref();
    let format = ParamFormat::from_path(path)?;
    let text = ParamDocument::from_parameters(params).render(format)?;

    fs::write(path, text)?;
    info!("Saved {} parameters to {}", params.kind(), path.display());

    Ok(())
}

/// Drop the `%YAML:1.0` directive OpenCV writes, which YAML parsers reject.
pub(crate) fn strip_yaml_directive(text: &str) -> &str {
    let trimmed = text.trim_start();

    if trimmed.starts_with("%YAML") {
        match trimmed.find('\n') {
            Some(i) => &trimmed[i + 1..],
            None => ""
        }
    }
    else {
        text
    }
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl ParamFormat {
    /// Pick the format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "yml" | "yaml" => Ok(ParamFormat::Yaml),
            "xml" => Ok(ParamFormat::Xml),
            "json" => Ok(ParamFormat::Json),
            _ => Err(Error::UnsupportedExtension(ext))
        }
    }
}

impl ParamDocument {
    pub fn from_parameters(params: &MatcherParameters) -> Self {
        let mut doc = ParamDocument {
            name: params.kind().tag().to_string(),
            ..Default::default()
        };

        for &field in available_fields(params.kind()) {
            doc.put(field, params.get(field));
        }

        doc
    }

    pub fn parse(text: &str, format: ParamFormat) -> Result<Self> {
        let bad = |e: &dyn std::fmt::Display| Error::FileFormat(e.to_string());

        match format {
            ParamFormat::Yaml => serde_yaml::from_str(strip_yaml_directive(text)).map_err(|e| bad(&e)),
            ParamFormat::Xml => quick_xml::de::from_str(text).map_err(|e| bad(&e)),
            ParamFormat::Json => serde_json::from_str(text).map_err(|e| bad(&e))
        }
    }

    pub fn render(&self, format: ParamFormat) -> Result<String> {
        let bad = |e: &dyn std::fmt::Display| Error::FileFormat(e.to_string());

        match format {
            ParamFormat::Yaml => {
                let body = serde_yaml::to_string(self).map_err(|e| bad(&e))?;
                Ok(format!("{}{}", YAML_HEADER, body))
            }
            ParamFormat::Xml => {
                let mut body = String::new();
                let mut ser = quick_xml::se::Serializer::with_root(&mut body, Some(XML_ROOT))
                    .map_err(|e| bad(&e))?;
                ser.indent(' ', 2);
                self.serialize(ser).map_err(|e| bad(&e))?;
                Ok(format!("{}{}\n", XML_HEADER, body))
            }
            ParamFormat::Json => serde_json::to_string_pretty(self).map_err(|e| bad(&e))
        }
    }

    /// The algorithm kind named by the document.
    pub fn kind(&self) -> Result<AlgorithmKind> {
        let name = self.name.trim().trim_matches('"');

        AlgorithmKind::from_tag(name)
            .ok_or_else(|| Error::FileFormat(format!("unrecognised matcher name {:?}", self.name)))
    }

    pub fn get(&self, field: FieldId) -> Option<i32> {
        match field {
            FieldId::BlockSize => self.block_size,
            FieldId::MinDisparity => self.min_disparity,
            FieldId::NumDisparities => self.num_disparities,
            FieldId::Disp12MaxDiff => self.disp12_max_diff,
            FieldId::SpeckleRange => self.speckle_range,
            FieldId::SpeckleWindowSize => self.speckle_window_size,
            FieldId::PreFilterCap => self.pre_filter_cap,
            FieldId::PreFilterSize => self.pre_filter_size,
            FieldId::PreFilterType => self.pre_filter_type,
            FieldId::TextureThreshold => self.texture_threshold,
            FieldId::UniquenessRatio => self.uniqueness_ratio,
            FieldId::P1 => self.p1,
            FieldId::P2 => self.p2,
            FieldId::Mode => self.mode
        }
    }

    fn put(&mut self, field: FieldId, value: Option<i32>) {
        let slot = match field {
            FieldId::BlockSize => &mut self.block_size,
            FieldId::MinDisparity => &mut self.min_disparity,
            FieldId::NumDisparities => &mut self.num_disparities,
            FieldId::Disp12MaxDiff => &mut self.disp12_max_diff,
            FieldId::SpeckleRange => &mut self.speckle_range,
            FieldId::SpeckleWindowSize => &mut self.speckle_window_size,
            FieldId::PreFilterCap => &mut self.pre_filter_cap,
            FieldId::PreFilterSize => &mut self.pre_filter_size,
            FieldId::PreFilterType => &mut self.pre_filter_type,
            FieldId::TextureThreshold => &mut self.texture_threshold,
            FieldId::UniquenessRatio => &mut self.uniqueness_ratio,
            FieldId::P1 => &mut self.p1,
            FieldId::P2 => &mut self.p2,
            FieldId::Mode => &mut self.mode
        };

        *slot = value;
    }

    /// Present fields that belong to the document's kind, in the kind's field order.
    pub fn fields(&self) -> Result<Vec<(FieldId, i32)>> {
        let kind = self.kind()?;

        Ok(available_fields(kind)
            .iter()
            .filter_map(|&f| self.get(f).map(|v| (f, v)))
            .collect())
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
