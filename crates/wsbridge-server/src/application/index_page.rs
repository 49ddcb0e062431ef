//! HTML index page listing the enabled demos.
//!
//! Links are absolute and built from the host the browser used to reach the
//! page, so they keep working behind port forwarding.  The scheme follows
//! the request as well: a page served over HTTPS links to `https://` and
//! `wss://`, a plain one to `http://` and `ws://`.

use html_escape::encode_double_quoted_attribute;

use crate::domain::Features;

const TITLE: &str = "Demo websocket / SSE bridge";

/// Renders the index page for a request addressed to `host` (a `Host`
/// header value such as `localhost:8080`); `secure` is true when the page
/// itself was requested over HTTPS.
pub fn render_index(host: &str, secure: bool, features: Features) -> String {
    let host = encode_double_quoted_attribute(host);
    let (http, ws) = if secure { ("https", "wss") } else { ("http", "ws") };
    let mut body = String::from("<h1>WebSocket/SSE bridge demo</h1>");

    if features.websocket {
        body.push_str("<h2>Websocket</h2><ul>");
        body.push_str(&link(&format!("{ws}://{host}/ws/datetime"), "Ask for current date and time"));
        body.push_str("</ul>");
    }
    if features.sse {
        body.push_str("<h2>Server Sent Events</h2><ul>");
        body.push_str(&link(
            &format!("{http}://{host}/sse/datetime"),
            "Ask for current date and time",
        ));
        body.push_str(&link(
            &format!("{http}://{host}/custom/sse/datetime"),
            "Ask for current date and time (direct bridge)",
        ));
        body.push_str("</ul>");
    }

    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{TITLE}</title></head><body>{body}</body></html>"
    )
}

fn link(href: &str, text: &str) -> String {
    format!("<li><a href=\"{href}\">{text}</a></li>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_features_list_every_demo() {
        let html = render_index("localhost:8080", false, Features::all());

        assert!(html.contains("<title>Demo websocket / SSE bridge</title>"));
        assert!(html.contains("href=\"ws://localhost:8080/ws/datetime\""));
        assert!(html.contains("href=\"http://localhost:8080/sse/datetime\""));
        assert!(html.contains("href=\"http://localhost:8080/custom/sse/datetime\""));
    }

    #[test]
    fn test_disabled_websocket_hides_its_section() {
        let features = Features {
            websocket: false,
            sse: true,
        };

        let html = render_index("example.org", false, features);

        assert!(!html.contains("<h2>Websocket</h2>"));
        assert!(!html.contains("ws://"));
        assert!(html.contains("<h2>Server Sent Events</h2>"));
    }

    #[test]
    fn test_disabled_sse_hides_its_section() {
        let features = Features {
            websocket: true,
            sse: false,
        };

        let html = render_index("example.org", false, features);

        assert!(html.contains("ws://example.org/ws/datetime"));
        assert!(!html.contains("sse/datetime"));
    }

    #[test]
    fn test_host_is_escaped() {
        let html = render_index("evil\"><script>", false, Features::all());
        assert!(!html.contains("<script>"));
        assert!(html.contains("evil&quot;&gt;&lt;script&gt;"));
    }

    #[test]
    fn test_secure_request_links_use_tls_schemes() {
        let html = render_index("demo.example:443", true, Features::all());

        assert!(html.contains("href=\"wss://demo.example:443/ws/datetime\""));
        assert!(html.contains("href=\"https://demo.example:443/sse/datetime\""));
        assert!(html.contains("href=\"https://demo.example:443/custom/sse/datetime\""));
        assert!(!html.contains("http://"));
        assert!(!html.contains("ws://"));
    }
}
