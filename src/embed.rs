use serde::Serialize;

pub const DEFAULT_EMBED_BASE_URL: &str = "https://flo.uri.sh/visualisation";

/// Permissions granted to embedded visualisations
pub const EMBED_SANDBOX: &str = "allow-same-origin allow-forms allow-scripts allow-downloads \
allow-popups allow-popups-to-escape-sandbox allow-top-navigation-by-user-activation";

/// An iframe embedding a published visualisation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedFrame {
    pub src: String,
    pub title: String,
    pub class: String,
    pub sandbox: String,
    pub style: String,
}

impl EmbedFrame {
    pub fn new(base_url: &str, id: &str) -> Self {
        Self {
            src: embed_url(base_url, id),
            title: "Interactive or visual content".to_string(),
            class: "flourish-embed-iframe".to_string(),
            sandbox: EMBED_SANDBOX.to_string(),
            style: "width: 100%; height: 100%;".to_string(),
        }
    }

    /// Markup that replaces the whole contents of the embed region
    pub fn html(&self) -> String {
        format!(
            r#"<iframe src="{}" title="{}" class="{}" frameborder="0" scrolling="no" sandbox="{}" style="{}"></iframe>"#,
            escape_attr(&self.src),
            escape_attr(&self.title),
            escape_attr(&self.class),
            escape_attr(&self.sandbox),
            escape_attr(&self.style),
        )
    }
}

pub fn embed_url(base_url: &str, id: &str) -> String {
    format!(
        "{}/{}/embed",
        base_url.trim_end_matches('/'),
        urlencoding::encode(id)
    )
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_points_at_embed_endpoint() {
        let frame = EmbedFrame::new(DEFAULT_EMBED_BASE_URL, "1234567");
        assert_eq!(frame.src, "https://flo.uri.sh/visualisation/1234567/embed");

        let html = frame.html();
        assert!(html.starts_with("<iframe src=\"https://flo.uri.sh/visualisation/1234567/embed\""));
        assert!(html.contains("allow-popups-to-escape-sandbox"));
        assert!(html.contains("allow-top-navigation-by-user-activation"));
        assert!(html.contains("width: 100%; height: 100%;"));
    }

    #[test]
    fn ids_cannot_break_out_of_attributes() {
        let frame = EmbedFrame::new("https://example.test/", "\"><script>");
        assert!(!frame.html().contains("<script>"));
        assert!(frame.src.starts_with("https://example.test/%22"));
    }
}
