//! Version-3 source maps written next to generated stylesheets and bundles

use serde::Serialize;
use std::path::Path;

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// A source map document
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u8,
    pub file: String,
    pub sources: Vec<String>,
    pub sources_content: Vec<String>,
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    pub fn new(file: &str) -> Self {
        SourceMap {
            version: 3,
            file: file.to_string(),
            sources: Vec::new(),
            sources_content: Vec::new(),
            names: Vec::new(),
            mappings: String::new(),
        }
    }

    /// Register a source and return its index
    pub fn add_source(&mut self, name: &str, content: &str) -> usize {
        self.sources.push(name.to_string());
        self.sources_content.push(content.to_string());
        self.sources.len() - 1
    }

    pub fn with_mappings(mut self, mappings: String) -> Self {
        self.mappings = mappings;
        self
    }

    pub fn to_json(&self) -> Vec<u8> {
        // Plain strings and integers always serialize
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Builds a `mappings` string one generated line at a time
///
/// Each mapped line gets a single segment pointing at column 0 of a source line.
#[derive(Debug, Default)]
pub struct LineMappings {
    out: String,
    lines: usize,
    prev_source: i64,
    prev_line: i64,
}

impl LineMappings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map the next generated line to `line` of `source`
    pub fn map_line(&mut self, source: usize, line: usize) {
        self.next_line();
        let (source, line) = (source as i64, line as i64);
        encode_vlq(&mut self.out, 0);
        encode_vlq(&mut self.out, source - self.prev_source);
        encode_vlq(&mut self.out, line - self.prev_line);
        encode_vlq(&mut self.out, 0);
        self.prev_source = source;
        self.prev_line = line;
    }

    /// Map every line of `text` (as it appears in the output) to `source`
    pub fn map_segment(&mut self, source: usize, text: &str) {
        for line in 0..text.split('\n').count() {
            self.map_line(source, line);
        }
    }

    pub fn finish(self) -> String {
        self.out
    }

    fn next_line(&mut self) {
        if self.lines > 0 {
            self.out.push(';');
        }
        self.lines += 1;
    }
}

/// Base64 VLQ encoding of one signed value
pub fn encode_vlq(out: &mut String, value: i64) {
    let mut vlq = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };

    loop {
        let mut digit = (vlq & 0b11111) as usize;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 0b100000;
        }
        out.push(BASE64[digit] as char);
        if vlq == 0 {
            break;
        }
    }
}

/// URL of the map for `relative` (an output path below the destination), as
/// seen from the generated file
pub fn map_url(relative: &Path, maps_dir: &str) -> String {
    let depth = relative.components().count().saturating_sub(1);
    format!(
        "{}{}/{}.map",
        "../".repeat(depth),
        maps_dir.trim_end_matches('/'),
        crate::pipeline::slash_path(relative)
    )
}

/// The trailing comment linking a script to its map
pub fn script_comment(url: &str) -> String {
    format!("\n//# sourceMappingURL={}\n", url)
}

/// The trailing comment linking a stylesheet to its map
pub fn style_comment(url: &str) -> String {
    format!("\n/*# sourceMappingURL={} */\n", url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn vlq(value: i64) -> String {
        let mut out = String::new();
        encode_vlq(&mut out, value);
        out
    }

    #[test]
    fn test_encode_vlq() {
        assert_eq!(vlq(0), "A");
        assert_eq!(vlq(1), "C");
        assert_eq!(vlq(-1), "D");
        assert_eq!(vlq(15), "e");
        assert_eq!(vlq(16), "gB");
        assert_eq!(vlq(-17), "jB");
    }

    #[test]
    fn test_line_mappings_for_concatenation() {
        let mut mappings = LineMappings::new();
        mappings.map_segment(0, "var a = 1;\nvar b = 2;");
        mappings.map_segment(1, "var c = 3;");
        // line 0 -> (0,0), line 1 -> (0,1), line 2 -> (1,0)
        assert_eq!(mappings.finish(), "AAAA;AACA;ACDA");
    }

    #[test]
    fn test_map_url_depth() {
        assert_eq!(map_url(&PathBuf::from("index.min.js"), "maps"), "maps/index.min.js.map");
        assert_eq!(
            map_url(&PathBuf::from("pages/home.css"), "maps/"),
            "../maps/pages/home.css.map"
        );
    }

    #[test]
    fn test_source_map_json() {
        let mut map = SourceMap::new("index.min.js");
        map.add_source("src/javascript/a.js", "const x = 1;");
        let json: serde_json::Value = serde_json::from_slice(&map.to_json()).unwrap();
        assert_eq!(json["version"], 3);
        assert_eq!(json["file"], "index.min.js");
        assert_eq!(json["sources"][0], "src/javascript/a.js");
        assert_eq!(json["sourcesContent"][0], "const x = 1;");
        assert_eq!(json["mappings"], "");
    }
}
