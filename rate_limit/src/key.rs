//! Deterministic rate-limit key composition.
//!
//! A key has three components joined by `:`:
//!
//! ```text
//! <scope>:<identity>:<principal>
//! login:1.2.3.4:alice
//! ```
//!
//! - `scope` names the guarded operation (e.g. `login`).
//! - `identity` identifies the caller (e.g. client IP address).
//! - `principal` identifies the target account; it is trimmed and lowercased
//!   so `" Alice "` and `"alice"` share one counter.
//!
//! `%` and `:` inside a component are percent-escaped, so IPv6 addresses or
//! odd usernames can never shift a component boundary and make two distinct
//! targets share a key.

/// Scope used for interactive login attempts.
pub const LOGIN_SCOPE: &str = "login";

const SEPARATOR: char = ':';

/// Builds the key for `(scope, identity, principal)`.
pub fn build_key(scope: &str, identity: &str, principal: &str) -> String {
    let principal = normalize_principal(principal);
    let mut key = String::with_capacity(scope.len() + identity.len() + principal.len() + 2);
    push_component(&mut key, scope);
    key.push(SEPARATOR);
    push_component(&mut key, identity);
    key.push(SEPARATOR);
    push_component(&mut key, &principal);
    key
}

/// Key for login attempts of `username` coming from `client_ip`.
pub fn build_login_key(client_ip: &str, username: &str) -> String {
    build_key(LOGIN_SCOPE, client_ip, username)
}

/// Case and whitespace normalization applied to the principal component.
pub fn normalize_principal(principal: &str) -> String {
    principal.trim().to_lowercase()
}

fn push_component(key: &mut String, component: &str) {
    for c in component.chars() {
        match c {
            '%' => key.push_str("%25"),
            ':' => key.push_str("%3A"),
            _ => key.push(c),
        }
    }
}
