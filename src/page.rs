//! Preview page rendering
//!
//! Builds the HTML document served at `/`. The page loads the tracking
//! client, exposes the app config and calls the app's `inject` entry point
//! exactly once with `{ config, posthog }`, where `trackingClient` is
//! passed as an alias of `posthog`.
//!
//! Values are never spliced into the page as raw text: JSON goes through
//! [`script_json`] and everything shown as HTML goes through [`escape_html`].

use serde::Serialize;
use serde_json::Value;

use crate::manifest::{ConfigMapping, Manifest, Surface};
use crate::script::BuildResult;

/// Tracking client bootstrap, embedded verbatim.
pub const TRACKING_SNIPPET: &str = r#"!function(t,e){var o,n,p,r;e.__SV||(window.posthog=e,e._i=[],e.init=function(i,s,a){function g(t,e){var o=e.split(".");2==o.length&&(t=t[o[0]],e=o[1]),t[e]=function(){t.push([e].concat(Array.prototype.slice.call(arguments,0)))}}(p=t.createElement("script")).type="text/javascript",p.async=!0,p.src=s.api_host+"/static/array.js",(r=t.getElementsByTagName("script")[0]).parentNode.insertBefore(p,r);var u=e;for(void 0!==a?u=e[a]=[]:a="posthog",u.people=u.people||[],u.toString=function(t){var e="posthog";return"posthog"!==a&&(e+="."+a),t||(e+=" (stub)"),e},u.people.toString=function(){return u.toString(1)+".people (stub)"},o="capture identify alias people.set people.set_once set_config register register_once unregister opt_out_capturing has_opted_out_capturing opt_in_capturing reset isFeatureEnabled onFeatureFlags".split(" "),n=0;n<o.length;n++)g(u,o[n]);e._i.push([i,s,a])},e.__SV=1)}(document,window.posthog||[]);"#;

/// Default API key passed to the tracking client.
pub const DEFAULT_API_KEY: &str = "test";

/// Default API host passed to the tracking client.
pub const DEFAULT_API_HOST: &str = "http://localhost:8000";

/// Path of the live-reload event stream.
pub const RELOAD_PATH: &str = "/_reload";

/// Tracking client settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingOptions {
    pub api_key: String,
    pub api_host: String,
}

impl Default for TrackingOptions {
    fn default() -> Self {
        Self { api_key: DEFAULT_API_KEY.to_string(), api_host: DEFAULT_API_HOST.to_string() }
    }
}

/// Options for [`render_page`]
#[derive(Debug, Clone)]
pub struct PageOptions {
    pub surface: Surface,
    pub tracking: TrackingOptions,
    /// File name shown to the user for the app source, e.g. `site.ts`
    pub source_name: String,
}

impl PageOptions {
    pub fn new(surface: Surface) -> Self {
        Self {
            surface,
            tracking: TrackingOptions::default(),
            source_name: surface.default_source().to_string(),
        }
    }
}

/// Render the preview page for a surface.
///
/// # Arguments
/// - `manifest` - Parsed `plugin.json`, used for titles and the storage key
/// - `config` - Defaults of the fields applicable to the surface
/// - `build` - The app script; a site page without one shows a notice
/// - `options` - Surface, tracking settings and the source display name
///
/// # Returns
/// The complete HTML document. It calls the app's `inject` export exactly
/// once when a script is present.
///
/// # Example
/// ```ignore
/// let manifest = Manifest::load(Path::new("plugin.json"))?;
/// let config = manifest.config_mapping(Surface::Site);
/// let html = render_page(&manifest, &config, &build, &PageOptions::new(Surface::Site));
/// ```
pub fn render_page(
    manifest: &Manifest,
    config: &ConfigMapping,
    build: &BuildResult,
    options: &PageOptions,
) -> String {
    let mut html = String::with_capacity(4096);
    html.push_str("\n<html>\n    <head>\n        <title>");
    html.push_str(&escape_html(manifest.display_name("PostHog App")));
    html.push_str("</title>\n");
    push_tracking(&mut html, options);

    match options.surface {
        Surface::Site => push_site(&mut html, manifest, config, build, options),
        Surface::Web => push_web(&mut html, manifest, config, build),
    }

    html.push_str("</html>\n");
    html
}

fn push_tracking(html: &mut String, options: &PageOptions) {
    html.push_str("        <script>\n            ");
    html.push_str(TRACKING_SNIPPET);
    html.push_str("\n            posthog.init(");
    html.push_str(&script_json(&options.tracking.api_key));
    html.push_str(", {\n                api_host: ");
    html.push_str(&script_json(&options.tracking.api_host));
    html.push_str(",\n                ");
    html.push_str(options.surface.opt_out_option());
    html.push_str(": false, // opt out of all other apps\n            })\n        </script>\n");
}

fn push_site(
    html: &mut String,
    manifest: &Manifest,
    config: &ConfigMapping,
    build: &BuildResult,
    options: &PageOptions,
) {
    html.push_str(
        r#"        <script type="text/javascript">
            if ('EventSource' in window) {
                ;(function () {
                    var eventSource = new EventSource('"#,
    );
    html.push_str(RELOAD_PATH);
    html.push_str(
        r#"');
                    eventSource.onmessage = () => window.location.reload()
                    console.log('Live reload enabled.')
                })()
            }
        </script>
        <script>
            const localStorageKey = "#,
    );
    html.push_str(&script_json(&manifest.storage_key()));
    html.push_str(
        r#"
            function setConfig(config) {
                localStorage.setItem(localStorageKey, JSON.stringify(config))
            }
            function getDefaultConfig() {
                return "#,
    );
    html.push_str(&script_json_pretty(&config.to_value()));
    html.push_str(
        r#"
            }
            function getConfig() {
                return JSON.parse(localStorage.getItem(localStorageKey) || 'null') || getDefaultConfig()
            }
            function resetConfig() {
                localStorage.setItem(localStorageKey, null)
            }
        </script>
    </head>
    <body>
        <h1>"#,
    );
    html.push_str(&escape_html(manifest.display_name("PostHog Site App")));
    html.push_str("</h1>\n        <pre>plugin.json = ");
    html.push_str(&escape_html(&pretty(&manifest.raw)));
    html.push_str("</pre>\n        <h2>");
    let source_name = escape_html(&options.source_name);
    html.push_str(&source_name);
    html.push_str("</h2>\n");

    match &build.script {
        Some(script) => {
            html.push_str("        <p>\n            Edit <code>");
            html.push_str(&source_name);
            html.push_str(
                r#"</code> and save to reload. Look at the browser console for errors.
            Update the plugin's config below:
        </p>
        <textarea id='siteConfig' style='width:100%;height:30vh;'></textarea>
        <script>document.getElementById("siteConfig").value = JSON.stringify(getConfig(), null, 4)</script>
        <button type='button' onclick='setConfig(JSON.parse(document.getElementById("siteConfig").value));window.location.reload()'>Update</button>
        <button type='button' onclick='resetConfig();window.location.reload()'>Reset</button>
        <script>
"#,
            );
            push_app_script(html, Some(script));
            html.push_str(
                "\n            exports.inject({ config: getConfig(), posthog: window.posthog, trackingClient: window.posthog });\n        </script>\n",
            );
        }
        None => {
            html.push_str("        This app does not come with a <code>");
            html.push_str(&source_name);
            html.push_str("</code> file.\n");
        }
    }
    html.push_str("    </body>\n");
}

fn push_web(html: &mut String, manifest: &Manifest, config: &ConfigMapping, build: &BuildResult) {
    let config_value = config.to_value();
    html.push_str("    </head>\n    <body>\n        <h1>");
    html.push_str(&escape_html(manifest.display_name("PostHog App")));
    html.push_str("</h1>\n        <pre>plugin = ");
    html.push_str(&escape_html(&pretty(&manifest.raw)));
    html.push_str("</pre>\n        <pre>config = ");
    html.push_str(&escape_html(&pretty(&config_value)));
    html.push_str("</pre>\n        <script>\n");
    push_app_script(html, build.script.as_deref());
    html.push_str("\n            var config = ");
    html.push_str(&script_json_pretty(&config_value));
    html.push_str(
        ";\n            exports.inject({ config: config, posthog: window.posthog, trackingClient: window.posthog });\n        </script>\n    </body>\n",
    );
}

/// Declare `exports` and run the app script in its own function scope.
///
/// Top-level bindings of the app (`const config`, `let exports`) must not
/// collide with the page's own.
fn push_app_script(html: &mut String, script: Option<&str>) {
    html.push_str("            let exports = {};\n            (function (exports) {\n");
    if let Some(script) = script {
        html.push_str(&script_body(script));
    }
    html.push_str("\n            })(exports);");
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Serialize `value` as a JSON literal safe to place inside `<script>`.
pub fn script_json<T: Serialize + ?Sized>(value: &T) -> String {
    escape_script_json(&serde_json::to_string(value).unwrap_or_else(|_| "null".to_string()))
}

/// Like [`script_json`], pretty printed.
pub fn script_json_pretty<T: Serialize + ?Sized>(value: &T) -> String {
    escape_script_json(&serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string()))
}

/// JSON text cannot contain a raw `<` or line separator once inlined.
fn escape_script_json(json: &str) -> String {
    json.replace('<', "\\u003c").replace('\u{2028}', "\\u2028").replace('\u{2029}', "\\u2029")
}

/// Transpiled code may legitimately contain `</script>` inside strings.
/// HTML matches the closing tag case-insensitively.
fn script_body(script: &str) -> String {
    let mut out = String::with_capacity(script.len());
    let mut rest = script;
    while let Some(pos) = rest.find("</") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 2..];
        let closes_script =
            after.as_bytes().get(..6).is_some_and(|tag| tag.eq_ignore_ascii_case(b"script"));
        out.push_str(if closes_script { "<\\/" } else { "</" });
        rest = after;
    }
    out.push_str(rest);
    out
}

/// Escape text for HTML element content.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const DEMO: &str = r#"{"name":"Demo","config":[{"key":"x","default":1,"site":true,"web":true}]}"#;

    fn render(surface: Surface, script: Option<&str>) -> String {
        let manifest = Manifest::parse(DEMO).unwrap();
        let config = manifest.config_mapping(surface);
        let build = BuildResult { script: script.map(String::from), duration: Duration::ZERO };
        render_page(&manifest, &config, &build, &PageOptions::new(surface))
    }

    #[test]
    fn test_site_page_with_script() {
        let html = render(Surface::Site, Some("function inject() {}\nexports.inject = inject;"));
        assert!(html.contains("<title>Demo</title>"));
        assert!(html.contains("<h1>Demo</h1>"));
        assert!(html.contains("posthog.init(\"test\""));
        assert!(html.contains("api_host: \"http://localhost:8000\""));
        assert!(html.contains("opt_in_site_apps: false"));
        assert!(html.contains("new EventSource('/_reload')"));
        assert!(html.contains("\"x\": 1"));
        assert!(html.contains("let exports = {};"));
        assert!(html.contains("exports.inject = inject;"));
        assert_eq!(html.matches("inject({").count(), 1);
        assert!(html.contains("inject({ config: getConfig(), posthog: window.posthog"));
    }

    #[test]
    fn test_site_page_without_script() {
        let html = render(Surface::Site, None);
        assert!(html.contains("This app does not come with a <code>site.ts</code> file."));
        assert!(!html.contains("inject({"));
        assert!(!html.contains("<textarea"));
        // the config editor bridge is still present
        assert!(html.contains("function getConfig()"));
    }

    #[test]
    fn test_site_page_storage_key() {
        let manifest = Manifest::parse(DEMO).unwrap();
        let html = render(Surface::Site, None);
        assert!(html.contains(&format!("const localStorageKey = \"{}\"", manifest.storage_key())));
    }

    #[test]
    fn test_web_page() {
        let html = render(Surface::Web, Some("function inject() {}"));
        assert!(html.contains("<h1>Demo</h1>"));
        assert!(html.contains("opt_in_web_app_injection: false"));
        assert!(!html.contains("EventSource"));
        assert!(!html.contains("localStorage"));
        assert!(html.contains("<pre>config = {\n  \"x\": 1\n}</pre>"));
        assert!(html.contains("var config = {\n  \"x\": 1\n};"));
        assert_eq!(html.matches("inject({").count(), 1);
        assert!(html.contains("inject({ config: config, posthog: window.posthog"));
    }

    #[test]
    fn test_default_titles() {
        let manifest = Manifest::parse("{}").unwrap();
        let config = ConfigMapping::default();
        let build = BuildResult::default();

        let site = render_page(&manifest, &config, &build, &PageOptions::new(Surface::Site));
        assert!(site.contains("<title>PostHog App</title>"));
        assert!(site.contains("<h1>PostHog Site App</h1>"));

        let web = render_page(&manifest, &config, &build, &PageOptions::new(Surface::Web));
        assert!(web.contains("<h1>PostHog App</h1>"));
    }

    #[test]
    fn test_values_are_escaped() {
        let manifest = Manifest::parse(
            r#"{"name":"<b>Evil</b>","config":[{"key":"k","default":"</script><script>alert(1)","site":true}]}"#,
        )
        .unwrap();
        let config = manifest.config_mapping(Surface::Site);
        let mut options = PageOptions::new(Surface::Site);
        options.tracking.api_key = "key\"</script>".to_string();
        let html = render_page(&manifest, &config, &BuildResult::default(), &options);

        assert!(html.contains("<title>&lt;b&gt;Evil&lt;/b&gt;</title>"));
        assert!(!html.contains("</script><script>alert(1)"));
        assert!(html.contains("\\u003c/script>\\u003cscript>alert(1)"));
        assert!(html.contains(r#"posthog.init("key\"\u003c/script>""#));
    }

    #[test]
    fn test_script_body_closing_tag() {
        assert_eq!(script_body("var s = '</script>'"), "var s = '<\\/script>'");
        assert_eq!(script_body("var s = '</SCRIPT>'"), "var s = '<\\/SCRIPT>'");
        assert_eq!(script_body("a('</ScRiPt ')"), "a('<\\/ScRiPt ')");
        assert_eq!(script_body("'</div>' + '</scr'"), "'</div>' + '</scr'");
        assert_eq!(script_body("'é</script>é'"), "'é<\\/script>é'");
    }

    #[test]
    fn test_app_script_runs_in_own_scope() {
        let html = render(Surface::Web, Some("const config = { debug: true };\nexports.inject = inject;"));
        let open = html.find("(function (exports) {").unwrap();
        let app_config = html.find("const config = { debug: true };").unwrap();
        let close = html.find("})(exports);").unwrap();
        let page_config = html.find("var config = {").unwrap();
        assert!(open < app_config && app_config < close && close < page_config);
        assert_eq!(html.matches("let exports = {};").count(), 1);
    }

    #[test]
    fn test_single_inject_call_with_tracking_client() {
        for surface in [Surface::Site, Surface::Web] {
            let html = render(surface, Some("function inject() {}\nexports.inject = inject;"));
            assert_eq!(html.matches("exports.inject({").count(), 1);
            assert_eq!(html.matches("trackingClient: window.posthog").count(), 1);
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a < b && c > d"), "a &lt; b &amp;&amp; c &gt; d");
        assert_eq!(escape_html("\"quoted\""), "\"quoted\"");
    }

    #[test]
    fn test_tracking_snippet_is_complete() {
        assert!(TRACKING_SNIPPET.starts_with("!function(t,e)"));
        assert!(TRACKING_SNIPPET.ends_with("(document,window.posthog||[]);"));
    }
}
