//! Template design context supplied once per session.
//!
//! Carries the colour and font scheme of a presentation template plus one
//! rendered reference image per layout. The image bytes are stored base64
//! encoded so the context survives checkpointing with the rest of the state.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::schemas::LayoutType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorScheme {
    pub dk1: String,
    pub dk2: String,
    pub lt1: String,
    pub lt2: String,
    pub accent1: String,
    pub accent2: String,
    pub accent3: String,
    pub accent4: String,
    pub accent5: String,
    pub accent6: String,
    pub hlink: String,
    #[serde(rename = "folHlink")]
    pub fol_hlink: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontScheme {
    pub major_latin: String,
    pub minor_latin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major_east_asian: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minor_east_asian: Option<String>,
}

/// Image bytes plus the URL they can be fetched from, if any
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceImage {
    #[serde(with = "base64_bytes")]
    pub bytes: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ReferenceImage {
    pub fn new(bytes: impl Into<Bytes>, url: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            url,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesignContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_scheme: Option<ColorScheme>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_scheme: Option<FontScheme>,
    #[serde(default)]
    pub layout_images: BTreeMap<LayoutType, ReferenceImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_image: Option<ReferenceImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_filename: Option<String>,
}

impl DesignContext {
    /// True when at least one template image is available
    pub fn has_templates(&self) -> bool {
        !self.layout_images.is_empty() || self.default_image.is_some()
    }

    /// Exact layout, then the fallback layout, then the default image
    pub fn template_for_layout(&self, layout: Option<LayoutType>) -> Option<&ReferenceImage> {
        if let Some(layout) = layout {
            if let Some(image) = self.layout_images.get(&layout) {
                return Some(image);
            }
            if let Some(image) = layout.fallback().and_then(|f| self.layout_images.get(&f)) {
                return Some(image);
            }
        }
        self.default_image.as_ref()
    }

    /// Scheme description injected into the visualizer context
    pub fn prompt_summary(&self) -> String {
        let mut lines = vec!["[Template Design]".to_string()];
        if let Some(name) = &self.source_filename {
            lines.push(format!("Template: {}", name));
        }
        if let Some(colors) = &self.color_scheme {
            lines.push(format!(
                "Colors: background {}, text {}, accents {} {} {} {} {} {}",
                colors.dk1,
                colors.lt1,
                colors.accent1,
                colors.accent2,
                colors.accent3,
                colors.accent4,
                colors.accent5,
                colors.accent6
            ));
        }
        if let Some(fonts) = &self.font_scheme {
            lines.push(format!(
                "Fonts: headings {}, body {}",
                fonts.major_latin, fonts.minor_latin
            ));
            if let (Some(major), Some(minor)) = (&fonts.major_east_asian, &fonts.minor_east_asian) {
                lines.push(format!("East Asian fonts: headings {}, body {}", major, minor));
            }
        }
        if !self.layout_images.is_empty() {
            let layouts: Vec<String> = self
                .layout_images
                .keys()
                .filter_map(|l| serde_json::to_value(l).ok())
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            lines.push(format!("Available layouts: {}", layouts.join(", ")));
        }
        lines.join("\n")
    }
}

/// serde adapter storing [`Bytes`] as a base64 string
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
