//! HTML served by the gateway: the application frame and the denial page.

/// Escape text for an HTML body or a double-quoted attribute.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = "body{margin:0;font-family:system-ui,sans-serif;background:#f5f6f8}\
.bar{display:flex;align-items:center;gap:1rem;padding:.5rem 1rem;background:#1f2937;color:#fff}\
.bar a{color:#93c5fd;text-decoration:none}\
iframe{border:0;width:100%;height:calc(100vh - 2.5rem)}\
.card{max-width:28rem;margin:15vh auto;padding:2rem;background:#fff;border-radius:.5rem;\
box-shadow:0 1px 3px rgba(0,0,0,.15);text-align:center}";

/// Page embedding the application at `frame_src` under a portal bar.
pub fn frame_page(app_name: &str, frame_src: &str, portal_url: &str, refresh_path: &str) -> String {
    format!(
        r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{name}</title>
<style>{STYLE}</style>
</head>
<body>
<div class="bar"><a href="{portal}">&larr; Back to portal</a><strong>{name}</strong></div>
<iframe src="{src}" title="{name}"></iframe>
<script>
setInterval(function () {{
  fetch("{refresh}", {{ method: "POST", credentials: "same-origin" }});
}}, 5 * 60 * 1000);
</script>
</body>
</html>
"#,
        name = escape_html(app_name),
        portal = escape_html(portal_url),
        src = escape_html(frame_src),
        refresh = escape_html(refresh_path),
    )
}

/// Fixed denial page. `reason` is a coarse, user-facing phrase.
pub fn denied_page(reason: &str, portal_url: &str) -> String {
    format!(
        r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Access denied</title>
<style>{STYLE}</style>
</head>
<body>
<div class="card">
<h1>Access denied</h1>
<p>{reason}</p>
<p><a href="{portal}">Return to the portal</a></p>
</div>
</body>
</html>
"#,
        reason = escape_html(reason),
        portal = escape_html(portal_url),
    )
}
