use std::sync::OnceLock;

use regex::Regex;

use crate::models::{AssetPath, VariantDescriptor};

fn sized_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<base>.+?)-(?P<width>\d+)x(?P<height>\d+)\.(?P<ext>[A-Za-z0-9]+)$")
            .expect("invalid sized variant regex")
    })
}

fn original_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<base>.+)\.(?P<ext>[A-Za-z0-9]+)$").expect("invalid original regex")
    })
}

impl VariantDescriptor {
    /// Split an asset path into base name, optional `WxH` suffix and extension.
    ///
    /// Returns `None` for names without an extension. The convention is derived from the
    /// suffix alone; the directory layout plays no part.
    pub fn parse(path: &AssetPath) -> Option<Self> {
        Self::parse_file_name(path.parent(), path.file_name())
    }

    /// Parse a bare file name that lives in `directory`.
    pub fn parse_file_name(directory: &str, file_name: &str) -> Option<Self> {
        if let Some(caps) = sized_pattern().captures(file_name) {
            let width = caps["width"].parse::<u32>().ok();
            let height = caps["height"].parse::<u32>().ok();
            if width.is_some() && height.is_some() {
                return Some(Self {
                    directory: directory.to_string(),
                    base_name: caps["base"].to_string(),
                    width,
                    height,
                    extension: caps["ext"].to_string(),
                });
            }
        }

        let caps = original_pattern().captures(file_name)?;
        Some(Self {
            directory: directory.to_string(),
            base_name: caps["base"].to_string(),
            width: None,
            height: None,
            extension: caps["ext"].to_string(),
        })
    }

    /// Returns `true` when the name carries no size suffix.
    pub fn is_original(&self) -> bool {
        self.width.is_none() || self.height.is_none()
    }

    /// File name this descriptor stands for.
    pub fn file_name(&self) -> String {
        match (self.width, self.height) {
            (Some(width), Some(height)) => self.sized_file_name(width, height),
            _ => self.original_file_name(),
        }
    }

    /// File name of the unsized original.
    pub fn original_file_name(&self) -> String {
        format!("{}.{}", self.base_name, self.extension)
    }

    /// File name of a sized variant of the same base name and extension.
    pub fn sized_file_name(&self, width: u32, height: u32) -> String {
        format!("{}-{}x{}.{}", self.base_name, width, height, self.extension)
    }

    /// Whether `other` shares this descriptor's directory, base name and extension.
    pub fn same_family(&self, other: &VariantDescriptor) -> bool {
        self.directory == other.directory
            && self.base_name == other.base_name
            && self.extension.eq_ignore_ascii_case(&other.extension)
    }

    /// Asset path of a file name in this descriptor's directory.
    pub fn path_for(&self, file_name: &str) -> AssetPath {
        if self.directory.is_empty() {
            AssetPath::new(file_name)
        } else {
            AssetPath::new(format!("{}/{}", self.directory, file_name))
        }
    }
}
