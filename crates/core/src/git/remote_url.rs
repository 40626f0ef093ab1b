//! Clone URL resolution for the target repository.
//!
//! The web host is taken from `GITHUB_SERVER_URL` when the workflow provides
//! one, otherwise it is derived from the API URL. An explicit clone URL in the
//! configuration (which may be a local path) always wins.

/// Resolve the URL to clone `repo` (`owner/name`) from.
///
/// Resolution order:
/// 1. `explicit`, if non-empty, is returned unchanged.
/// 2. `server_url`, if non-empty, is the web host.
/// 3. Otherwise the host is derived from `api_url`:
///    - `https://api.github.com` → `https://github.com`
///    - `https://<host>/api/v3`  → `https://<host>`
///    - anything else is used as-is, minus a trailing slash
pub fn resolve_clone_url(
    explicit: Option<&str>,
    api_url: &str,
    server_url: Option<&str>,
    repo: &str,
) -> String {
    if let Some(url) = non_empty(explicit) {
        return url.to_string();
    }
    format!("{}/{}.git", web_base_url(api_url, server_url), repo)
}

/// The web host URL with no trailing slash.
pub fn web_base_url(api_url: &str, server_url: Option<&str>) -> String {
    if let Some(server) = non_empty(server_url) {
        return server.trim_end_matches('/').to_string();
    }

    let url = api_url.trim().trim_end_matches('/');
    if url.eq_ignore_ascii_case("https://api.github.com") {
        return "https://github.com".to_string();
    }
    if let Some(base) = url.strip_suffix("/api/v3") {
        return base.to_string();
    }
    url.to_string()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
