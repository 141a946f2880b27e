//! Session cookie jar.
//!
//! # Design
//! Cookies are keyed by (name, domain, path). A `Set-Cookie` for an existing
//! key overwrites it. A `Set-Cookie` that is already expired removes it:
//! `Max-Age<=0`, or an `Expires` date in the past when no `Max-Age` is
//! given. Cookies without either attribute live as long as the client.
//!
//! IP-literal hosts never get domain cookies; a `Domain` naming anything
//! but the host itself rejects the cookie.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use url::{Host, Url};

/// A single stored cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// `false` when the cookie carried a `Domain` attribute and also
    /// applies to subdomains.
    pub host_only: bool,
    pub secure: bool,
    pub http_only: bool,
    /// `None` for session cookies.
    pub expires: Option<DateTime<Utc>>,
}

impl Cookie {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|t| t <= now)
    }

    fn matches(&self, url: &Url, now: DateTime<Utc>) -> bool {
        if self.is_expired(now) {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        let domain_ok = if self.host_only {
            host == self.domain
        } else {
            host == self.domain || host.ends_with(&format!(".{}", self.domain))
        };
        domain_ok && path_matches(url.path(), &self.path) && (!self.secure || url.scheme() == "https")
    }
}

type CookieKey = (String, String, String);

/// Cookie store owned by a single session.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: BTreeMap<CookieKey, Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.values()
    }

    /// Value of the first unexpired cookie named `name`, regardless of scope.
    pub fn get(&self, name: &str) -> Option<&str> {
        let now = Utc::now();
        self.cookies
            .values()
            .find(|c| c.name == name && !c.is_expired(now))
            .map(|c| c.value.as_str())
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    /// Merge the `Set-Cookie` header values of a response to `url`.
    pub fn store_response_cookies<'a>(&mut self, url: &Url, set_cookies: impl IntoIterator<Item = &'a str>) {
        for header in set_cookies {
            self.store(url, header);
        }
    }

    /// Merge a single `Set-Cookie` header value. Malformed values are ignored.
    pub fn store(&mut self, url: &Url, set_cookie: &str) {
        let Some(host) = url.host_str() else {
            return;
        };
        let ip_host = matches!(url.host(), Some(Host::Ipv4(_) | Host::Ipv6(_)));
        let mut parts = set_cookie.split(';');
        let Some((name, value)) = parts.next().and_then(|p| p.split_once('=')) else {
            return;
        };
        let name = name.trim();
        if name.is_empty() {
            return;
        }

        let mut cookie = Cookie {
            name: name.to_string(),
            value: value.trim().trim_matches('"').to_string(),
            domain: host.to_ascii_lowercase(),
            path: default_path(url.path()),
            host_only: true,
            secure: false,
            http_only: false,
            expires: None,
        };
        let mut max_age = None;
        let mut expires = None;

        for attr in parts {
            let (key, val) = match attr.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (attr.trim(), ""),
            };
            match key.to_ascii_lowercase().as_str() {
                "domain" if !val.is_empty() => {
                    let domain = val.trim_start_matches('.').to_ascii_lowercase();
                    let host = cookie.domain.as_str();
                    if ip_host {
                        if domain != host {
                            return;
                        }
                        continue;
                    }
                    // A response may only set cookies for its own domain or a parent of it.
                    if host != domain && !host.ends_with(&format!(".{domain}")) {
                        return;
                    }
                    cookie.domain = domain;
                    cookie.host_only = false;
                }
                "path" if val.starts_with('/') => cookie.path = val.to_string(),
                "max-age" => {
                    if let Ok(age) = val.parse::<i64>() {
                        max_age = Some(age);
                    }
                }
                "expires" => expires = parse_cookie_date(val),
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                _ => {}
            }
        }

        let now = Utc::now();
        // Max-Age wins over Expires.
        let expired = match max_age {
            Some(age) if age <= 0 => true,
            Some(age) => {
                cookie.expires =
                    TimeDelta::try_seconds(age).and_then(|d| now.checked_add_signed(d));
                false
            }
            None => {
                cookie.expires = expires;
                cookie.is_expired(now)
            }
        };

        let key = (cookie.name.clone(), cookie.domain.clone(), cookie.path.clone());
        if expired {
            self.cookies.remove(&key);
        } else {
            self.cookies.insert(key, cookie);
        }
    }

    /// Cookies applicable to a request for `url`, longest path first.
    pub fn cookies_for(&self, url: &Url) -> Vec<&Cookie> {
        let now = Utc::now();
        let mut matching: Vec<&Cookie> = self
            .cookies
            .values()
            .filter(|c| c.matches(url, now))
            .collect();
        matching.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        matching
    }

    /// `Cookie` request header for `url`, or `None` when nothing applies.
    pub fn cookie_header(&self, url: &Url) -> Option<String> {
        let cookies = self.cookies_for(url);
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// `Expires` value: RFC 1123 dates, also in the dashed `01-Jan-1970` form.
fn parse_cookie_date(value: &str) -> Option<DateTime<Utc>> {
    let normalized = value.replace('-', " ");
    DateTime::parse_from_rfc2822(&normalized)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Directory of the request path, used when `Set-Cookie` names no `Path`.
fn default_path(request_path: &str) -> String {
    match request_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => request_path[..idx].to_string(),
    }
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> Url {
        Url::parse("https://wiki.example.org/w/api.php").unwrap()
    }

    #[test]
    fn stores_and_returns_host_only_cookie() {
        let mut jar = CookieJar::new();
        jar.store(&api(), "wikisession=abc; path=/; HttpOnly");

        assert_eq!(jar.cookie_header(&api()).as_deref(), Some("wikisession=abc"));
        let other = Url::parse("https://sub.wiki.example.org/w/api.php").unwrap();
        assert!(jar.cookie_header(&other).is_none());
        assert!(jar.iter().next().unwrap().http_only);
    }

    #[test]
    fn same_name_domain_path_overwrites() {
        let mut jar = CookieJar::new();
        jar.store(&api(), "session=old; Path=/");
        jar.store(&api(), "session=new; Path=/");
        assert_eq!(jar.len(), 1);
        assert_eq!(jar.get("session"), Some("new"));
    }

    #[test]
    fn different_path_is_a_distinct_cookie() {
        let mut jar = CookieJar::new();
        jar.store(&api(), "pref=root; Path=/");
        jar.store(&api(), "pref=wiki; Path=/w");
        assert_eq!(jar.len(), 2);
        assert_eq!(jar.cookie_header(&api()).as_deref(), Some("pref=wiki; pref=root"));
    }

    #[test]
    fn max_age_zero_deletes() {
        let mut jar = CookieJar::new();
        jar.store(&api(), "UserName=Alice; Path=/");
        jar.store(&api(), "UserName=deleted; Path=/; Max-Age=0");
        assert!(jar.is_empty());
    }

    #[test]
    fn past_expires_deletes() {
        let mut jar = CookieJar::new();
        jar.store(&api(), "session=abc; Path=/");
        jar.store(&api(), "session=deleted; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT");
        assert!(jar.is_empty());
        assert!(jar.cookie_header(&api()).is_none());
    }

    #[test]
    fn dashed_expires_date_is_understood() {
        let mut jar = CookieJar::new();
        jar.store(&api(), "session=abc; Path=/");
        jar.store(&api(), "session=deleted; Path=/; Expires=Thu, 01-Jan-1970 00:00:00 GMT");
        assert!(jar.is_empty());
    }

    #[test]
    fn future_expires_keeps_cookie() {
        let mut jar = CookieJar::new();
        jar.store(&api(), "session=abc; Path=/; Expires=Fri, 01 Jan 2100 00:00:00 GMT");
        assert_eq!(jar.cookie_header(&api()).as_deref(), Some("session=abc"));
        assert!(jar.iter().next().unwrap().expires.is_some());
    }

    #[test]
    fn max_age_takes_precedence_over_expires() {
        let mut jar = CookieJar::new();
        jar.store(
            &api(),
            "kept=1; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=3600",
        );
        assert_eq!(jar.get("kept"), Some("1"));

        jar.store(&api(), "kept=2; Path=/; Max-Age=0; Expires=Fri, 01 Jan 2100 00:00:00 GMT");
        assert!(jar.is_empty());
    }

    #[test]
    fn unparsable_expires_is_a_session_cookie() {
        let mut jar = CookieJar::new();
        jar.store(&api(), "s=1; Path=/; Expires=whenever");
        assert_eq!(jar.get("s"), Some("1"));
        assert!(jar.iter().next().unwrap().expires.is_none());
    }

    #[test]
    fn ip_host_rejects_domain_cookies() {
        let local = Url::parse("http://127.0.0.1:3000/w/api.php").unwrap();
        let mut jar = CookieJar::new();
        jar.store(&local, "a=1; Domain=0.0.1; Path=/");
        assert!(jar.is_empty());

        jar.store(&local, "b=2; Domain=127.0.0.1; Path=/");
        let cookie = jar.iter().next().unwrap();
        assert!(cookie.host_only);
        assert_eq!(cookie.domain, "127.0.0.1");

        let other = Url::parse("http://10.127.0.0.1/w/api.php").unwrap();
        assert!(jar.cookie_header(&other).is_none());
    }

    #[test]
    fn domain_attribute_covers_subdomains() {
        let mut jar = CookieJar::new();
        jar.store(&api(), "central=1; Domain=.example.org; Path=/");
        let sibling = Url::parse("https://commons.example.org/w/api.php").unwrap();
        assert_eq!(jar.cookie_header(&sibling).as_deref(), Some("central=1"));
    }

    #[test]
    fn foreign_domain_is_rejected() {
        let mut jar = CookieJar::new();
        jar.store(&api(), "evil=1; Domain=attacker.net");
        assert!(jar.is_empty());
    }

    #[test]
    fn secure_cookie_not_sent_over_http() {
        let mut jar = CookieJar::new();
        jar.store(&api(), "s=1; Secure; Path=/");
        let plain = Url::parse("http://wiki.example.org/w/api.php").unwrap();
        assert!(jar.cookie_header(&plain).is_none());
        assert!(jar.cookie_header(&api()).is_some());
    }

    #[test]
    fn default_path_is_request_directory() {
        let mut jar = CookieJar::new();
        jar.store(&api(), "d=1");
        assert_eq!(jar.iter().next().unwrap().path, "/w");
        let outside = Url::parse("https://wiki.example.org/wiki/Main_Page").unwrap();
        assert!(jar.cookie_header(&outside).is_none());
    }

    #[test]
    fn malformed_header_is_ignored() {
        let mut jar = CookieJar::new();
        jar.store(&api(), "no-equals-sign");
        jar.store(&api(), "=value");
        assert!(jar.is_empty());
    }
}
