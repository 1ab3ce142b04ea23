//! Server-rendered HTML pages.
//!
//! Minimal `format!`-based rendering with one shared inline stylesheet —
//! no template engine. Every user-controlled string goes through
//! [`escape_html`] before interpolation.

use crate::accounts::Account;

/// Escape the five HTML-significant characters.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn banner(error: Option<&str>, notice: Option<&str>) -> String {
    match (error, notice) {
        (Some(e), _) => format!(r#"<div class="error">{}</div>"#, escape_html(e)),
        (None, Some(n)) => format!(r#"<div class="notice">{}</div>"#, escape_html(n)),
        (None, None) => String::new(),
    }
}

fn page(title: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en"><head>
<meta charset="utf-8"><meta name="viewport" content="width=device-width,initial-scale=1">
<title>Coffer - {title}</title>
<style>{style}</style>
</head><body>
<div class="card">
{content}
</div>
</body></html>"#,
        style = base_style(),
    )
}

/// GET / — landing page; links depend on whether a session is live.
pub fn render_index(user: Option<&str>) -> String {
    let content = match user {
        Some(user) => format!(
            r#"  <div class="logo"><h1>Coffer</h1><p>Finance prototype</p></div>
  <p>You're logged in as <strong>{}</strong>.</p>
  <div class="link">
    <a href="/profile">Profile</a> · <a href="/logout">Log out</a>
  </div>"#,
            escape_html(user),
        ),
        None => r#"  <div class="logo"><h1>Coffer</h1><p>Finance prototype</p></div>
  <p>Keep a private ledger of your spending.</p>
  <div class="link">
    <a href="/register">Register</a> · <a href="/login">Login</a>
  </div>"#
            .to_string(),
    };
    page("Home", &content)
}

/// GET/POST /register — account creation form, optionally with an error.
pub fn render_register(error: Option<&str>) -> String {
    let content = format!(
        r#"  <div class="logo"><h1>Create account</h1></div>
  {banner}
  <form method="POST" action="/register" autocomplete="off">
    <div class="form-group">
      <label>Username (3-32, letters/digits/_ only)</label>
      <input type="text" name="username" required placeholder="Enter username">
    </div>
    <div class="form-group">
      <label>Password</label>
      <input type="password" name="password" required placeholder="Enter password">
    </div>
    <button type="submit" class="btn btn-primary">Register</button>
  </form>
  <div class="link">Already have an account? <a href="/login">Login</a></div>"#,
        banner = banner(error, None),
    );
    page("Register", &content)
}

/// GET/POST /login — login form. `next` rides along as a hidden field so the
/// guard can return the caller to the page that sent them here.
pub fn render_login(next: &str, error: Option<&str>, notice: Option<&str>) -> String {
    let content = format!(
        r#"  <div class="logo"><h1>Login</h1></div>
  {banner}
  <form method="POST" action="/login" autocomplete="off">
    <input type="hidden" name="next" value="{next}">
    <div class="form-group">
      <label>Username</label>
      <input type="text" name="username" required autocomplete="username" placeholder="Enter username">
    </div>
    <div class="form-group">
      <label>Password</label>
      <input type="password" name="password" required autocomplete="current-password" placeholder="Enter password">
    </div>
    <button type="submit" class="btn btn-primary">Login</button>
  </form>
  <div class="link">No account yet? <a href="/register">Register</a></div>"#,
        banner = banner(error, notice),
        next = escape_html(next),
    );
    page("Login", &content)
}

/// GET /profile — the authenticated user's record.
pub fn render_profile(account: &Account, stored_path: &str) -> String {
    let content = format!(
        r#"  <div class="logo"><h1>Profile</h1></div>
  <p><strong>Username:</strong> {username}</p>
  <p><strong>Created:</strong> {created}</p>
  <p><strong>Stored file:</strong> <code>{path}</code></p>
  <div class="link"><a href="/">Home</a> · <a href="/logout">Log out</a></div>"#,
        username = escape_html(&account.username),
        created = account.created.to_rfc3339(),
        path = escape_html(stored_path),
    );
    page("Profile", &content)
}

/// 403 page shown when a session points at an account that no longer exists.
pub fn render_forbidden() -> String {
    let content = r#"  <div class="logo"><h1>Forbidden</h1></div>
  <p>Your session is no longer valid. Please log in again.</p>
  <div class="link"><a href="/login">Login</a></div>"#;
    page("Forbidden", content)
}

/// 429 page for rate-limited credential attempts.
pub fn render_slow_down() -> String {
    let content = r#"  <div class="logo"><h1>Slow down</h1></div>
  <p>Too many attempts. Please wait a minute and try again.</p>
  <div class="link"><a href="/">Home</a></div>"#;
    page("Too Many Requests", content)
}

fn base_style() -> &'static str {
    r#"
    * { margin: 0; padding: 0; box-sizing: border-box; }
    body {
        font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
        background: #f5f5f5; color: #333;
        display: flex; justify-content: center; align-items: center;
        min-height: 100vh; padding: 20px;
    }
    .card {
        background: #fff; border-radius: 16px; padding: 32px;
        max-width: 420px; width: 100%; box-shadow: 0 4px 24px rgba(0,0,0,0.08);
    }
    .card p { margin-bottom: 12px; font-size: 15px; }
    .card code { font-size: 12px; word-break: break-all; }
    .logo { text-align: center; margin-bottom: 24px; }
    .logo h1 { font-size: 28px; color: #1a1a2e; }
    .logo p { font-size: 14px; color: #666; margin-top: 4px; }
    .form-group { margin-bottom: 16px; }
    .form-group label { display: block; font-size: 14px; font-weight: 500; margin-bottom: 6px; color: #444; }
    .form-group input {
        width: 100%; padding: 12px 14px; border: 1.5px solid #ddd;
        border-radius: 10px; font-size: 16px; outline: none; transition: border-color 0.2s;
    }
    .form-group input:focus { border-color: #4a6cf7; }
    .btn {
        width: 100%; padding: 14px; border: none; border-radius: 10px;
        font-size: 16px; font-weight: 600; cursor: pointer; transition: background 0.2s;
    }
    .btn-primary { background: #4a6cf7; color: #fff; }
    .btn-primary:hover { background: #3b5de7; }
    .error { background: #fff0f0; color: #d32f2f; padding: 10px 14px; border-radius: 8px; font-size: 13px; margin-bottom: 16px; }
    .notice { background: #f0fff4; color: #1b7f3b; padding: 10px 14px; border-radius: 8px; font-size: 13px; margin-bottom: 16px; }
    .link { text-align: center; margin-top: 16px; font-size: 14px; color: #666; }
    .link a { color: #4a6cf7; text-decoration: none; }
    .link a:hover { text-decoration: underline; }
    "#
}

// ── Tests ───────────────────────────────────────────────────────────
