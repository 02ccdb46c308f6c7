//! Static content compiled into the binary.

pub const HOME_PAGE: &str = include_str!("../www/index.html");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Asset {
    pub content_type: &'static str,
    pub content: &'static str,
}

const ASSETS: &[(&str, Asset)] = &[
    (
        "positivitytracker/css/styles.css",
        Asset {
            content_type: "text/css; charset=utf-8",
            content: include_str!("../www/positivitytracker/css/styles.css"),
        },
    ),
    (
        "positivitytracker/js/home.js",
        Asset {
            content_type: "text/javascript; charset=utf-8",
            content: include_str!("../www/positivitytracker/js/home.js"),
        },
    ),
];

/// Finds the asset served under `/www/{path}`.
pub fn lookup(path: &str) -> Option<Asset> {
    ASSETS
        .iter()
        .find(|(name, _)| *name == path)
        .map(|(_, asset)| *asset)
}
