//! Image reference extractor
//!
//! Renders a chart's templates and scans the output for container image
//! references. Tag defaults to `latest` when the template carries none.
//! References are deduplicated in first-seen order before scanning.

use crate::common::command_utils::run_command;
use crate::error::ScanError;
use crate::scanner::ImageRef;
use log::debug;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

const IMAGE_MARKER: &str = "image:";

#[derive(Debug, Clone)]
pub struct ImageExtractor {
    helm_bin: String,
    timeout: Duration,
}

impl ImageExtractor {
    pub fn new(helm_bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            helm_bin: helm_bin.into(),
            timeout,
        }
    }

    /// Render the chart at `chart_dir` and collect every image reference
    /// from the output.
    pub async fn extract(
        &self,
        chart: &str,
        chart_dir: &Path,
    ) -> std::result::Result<Vec<ImageRef>, ScanError> {
        let dir = chart_dir.display().to_string();
        let output = run_command(&self.helm_bin, &["template", &dir], None, self.timeout)
            .await
            .map_err(|e| ScanError::TemplateRender {
                chart: chart.to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ScanError::TemplateRender {
                chart: chart.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let images = parse_rendered_images(&String::from_utf8_lossy(&output.stdout));
        debug!("Found images {:?} in chart {}", images, chart);
        Ok(images)
    }
}

/// Scan rendered template output for `image:` lines.
///
/// Quoting and whitespace are stripped, then the line splits on `:` into
/// `{marker, registry/image, tag}`; fewer than three parts means no explicit
/// tag, which defaults to `latest`.
pub fn parse_rendered_images(rendered: &str) -> Vec<ImageRef> {
    let mut seen: HashSet<ImageRef> = HashSet::new();
    let mut images: Vec<ImageRef> = Vec::new();

    for line in rendered.lines() {
        if !line.contains(IMAGE_MARKER) {
            continue;
        }
        let cleaned: String = line
            .chars()
            .filter(|c| !matches!(c, '"' | '\'' | ' ' | '\t'))
            .collect();
        let parts: Vec<&str> = cleaned.split(':').collect();
        let Some(name) = parts.get(1).filter(|n| !n.is_empty()) else {
            continue;
        };
        let tag = if parts.len() < 3 { "latest" } else { parts[2] };

        let image = ImageRef::new(*name, tag);
        if seen.insert(image.clone()) {
            images.push(image);
        }
    }
    images
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_image_with_tag() {
        let images = parse_rendered_images("  image: \"nginx:1.21\"\n");
        assert_eq!(images, vec![ImageRef::new("nginx", "1.21")]);
    }

    #[test]
    fn missing_tag_defaults_to_latest() {
        let images = parse_rendered_images("image: redis\n");
        assert_eq!(images, vec![ImageRef::new("redis", "latest")]);
    }

    #[test]
    fn duplicates_collapse_in_first_seen_order() {
        let rendered = "\
image: redis:6
image: \"nginx:1.21\"
image: redis:6
image: nginx
";
        let images = parse_rendered_images(rendered);
        assert_eq!(
            images,
            vec![
                ImageRef::new("redis", "6"),
                ImageRef::new("nginx", "1.21"),
                ImageRef::new("nginx", "latest"),
            ]
        );
    }

    #[test]
    fn list_item_and_registry_paths_are_kept() {
        let images = parse_rendered_images("  - image: quay.io/prometheus/node-exporter:v1.3.1\n");
        assert_eq!(
            images,
            vec![ImageRef::new("quay.io/prometheus/node-exporter", "v1.3.1")]
        );
    }

    #[test]
    fn bare_marker_is_ignored() {
        assert!(parse_rendered_images("      image:\n").is_empty());
        assert!(parse_rendered_images("no markers here\n").is_empty());
    }
}
