// SPDX-License-Identifier: AGPL-3.0-or-later
//! Location identifiers
//!
//! A [`Location`] is the canonical address of a node:
//! `scheme://[user[:password]@]host[:port]/path[?query]`, or an absolute
//! local path which maps onto the `file` scheme. Credentials ride along with
//! the value but never take part in equality or hashing, so the same place
//! reached with different logins is still the same location.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{VfaError, VfaResult};

/// Scheme used for local paths
pub const LOCAL_SCHEME: &str = "file";

const SEGMENT_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

const USERINFO_SET: &AsciiSet = &SEGMENT_SET.add(b':').add(b'@').add(b'[').add(b']');

/// Login attached to a location
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: Option<String>) -> Self {
        Self { username: username.into(), password }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// How path segments compare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseRule {
    Sensitive,
    Insensitive,
}

/// Canonical, comparable address of a node
#[derive(Clone)]
pub struct Location {
    scheme: String,
    host: Option<String>,
    port: Option<u16>,
    segments: Vec<String>,
    query: Option<String>,
    credentials: Option<Credentials>,
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "ftp" => Some(21),
        "sftp" | "ssh" => Some(22),
        "http" | "webdav" => Some(80),
        "https" | "webdavs" => Some(443),
        "smb" => Some(445),
        "nfs" => Some(2049),
        _ => None,
    }
}

/// Number of leading segments that make up the root of a scheme.
fn root_depth(scheme: &str) -> usize {
    match scheme {
        "s3" | "gs" => 1,
        _ => 0,
    }
}

/// Push `parts` onto `segments`, dropping empty and `.` parts and popping
/// on `..` without ever climbing above the root.
fn normalize_into<'a>(segments: &mut Vec<String>, parts: impl Iterator<Item = &'a str>) {
    for part in parts {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(part.to_string()),
        }
    }
}

fn decode(text: &str) -> VfaResult<String> {
    percent_decode_str(text)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| VfaError::MalformedLocation(format!("invalid UTF-8 in {text:?}")))
}

fn validate_segment(segment: &str) -> VfaResult<()> {
    match segment {
        "" => Err(VfaError::MalformedLocation("empty path segment".into())),
        "." | ".." => Err(VfaError::MalformedLocation(format!(
            "relative segment {segment:?} is not a valid name"
        ))),
        s if s.contains('\0') => Err(VfaError::MalformedLocation("NUL in path segment".into())),
        _ => Ok(()),
    }
}

fn is_windows_drive(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'/' || bytes[2] == b'\\')
}

impl Location {
    /// Parse a URL or an absolute local path.
    pub fn parse(text: &str) -> VfaResult<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VfaError::MalformedLocation("empty location".into()));
        }

        if text.starts_with('/') || (cfg!(windows) && is_windows_drive(text)) {
            return Ok(Self::local_from_str(text));
        }

        if !text.contains("://") {
            return Err(VfaError::MalformedLocation(format!(
                "neither a URL nor an absolute path: {text}"
            )));
        }

        let url = Url::parse(text)
            .map_err(|e| VfaError::MalformedLocation(format!("{text}: {e}")))?;
        Self::from_url(&url)
    }

    /// Location for an absolute local path.
    pub fn from_path(path: &Path) -> VfaResult<Self> {
        if !path.is_absolute() {
            return Err(VfaError::MalformedLocation(format!(
                "not an absolute path: {}",
                path.display()
            )));
        }
        Ok(Self::local_from_str(&path.to_string_lossy()))
    }

    fn local_from_str(text: &str) -> Self {
        let mut segments = Vec::new();
        if cfg!(windows) {
            normalize_into(&mut segments, text.split(['/', '\\']));
        } else {
            normalize_into(&mut segments, text.split('/'));
        }
        Self {
            scheme: LOCAL_SCHEME.to_string(),
            host: None,
            port: None,
            segments,
            query: None,
            credentials: None,
        }
    }

    fn from_url(url: &Url) -> VfaResult<Self> {
        let scheme = url.scheme().to_ascii_lowercase();
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .map(|h| h.to_ascii_lowercase());
        let port = url.port().filter(|p| Some(*p) != default_port(&scheme));

        let mut segments = Vec::new();
        if let Some(parts) = url.path_segments() {
            let decoded = parts.map(decode).collect::<VfaResult<Vec<_>>>()?;
            normalize_into(&mut segments, decoded.iter().map(String::as_str));
        } else if !url.path().is_empty() {
            return Err(VfaError::MalformedLocation(format!(
                "{url}: path cannot be determined"
            )));
        }

        let credentials = if url.username().is_empty() {
            None
        } else {
            Some(Credentials {
                username: decode(url.username())?,
                password: url.password().map(decode).transpose()?,
            })
        };

        Ok(Self {
            scheme,
            host,
            port,
            segments,
            query: url.query().map(String::from),
            credentials,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Explicit port, or the scheme's well-known one.
    pub fn effective_port(&self) -> Option<u16> {
        self.port.or_else(|| default_port(&self.scheme))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn set_credentials(&mut self, credentials: Option<Credentials>) {
        self.credentials = credentials;
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn without_credentials(&self) -> Self {
        self.clone().with_credentials(None)
    }

    pub fn is_local(&self) -> bool {
        self.scheme == LOCAL_SCHEME
    }

    pub fn case_rule(&self) -> CaseRule {
        if self.is_local() && cfg!(any(windows, target_os = "macos")) {
            CaseRule::Insensitive
        } else {
            CaseRule::Sensitive
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Lower-cased extension of the last segment, without the dot.
    pub fn extension(&self) -> Option<String> {
        self.name().and_then(extension_of)
    }

    pub fn is_root(&self) -> bool {
        self.segments.len() <= root_depth(&self.scheme)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let mut parent = self.clone();
        parent.segments.pop();
        parent.query = None;
        Some(parent)
    }

    /// Same location truncated to its first `len` segments.
    pub fn truncated(&self, len: usize) -> Self {
        let mut loc = self.clone();
        loc.segments.truncate(len);
        loc.query = None;
        loc
    }

    /// Append a relative path of one or more `/`-separated literal segments.
    pub fn resolve_child(&self, relative: &str) -> VfaResult<Self> {
        let parts: Vec<&str> = relative.split('/').collect();
        for part in &parts {
            validate_segment(part)?;
        }
        let mut child = self.clone();
        child.query = None;
        child.segments.extend(parts.into_iter().map(String::from));
        Ok(child)
    }

    /// Append exactly one literal segment.
    pub fn resolve_direct_child(&self, name: &str) -> VfaResult<Self> {
        validate_segment(name)?;
        if name.contains('/') {
            return Err(VfaError::MalformedLocation(format!(
                "{name:?} is not a single path segment"
            )));
        }
        let mut child = self.clone();
        child.query = None;
        child.segments.push(name.to_string());
        Ok(child)
    }

    fn same_authority(&self, other: &Self) -> bool {
        self.scheme == other.scheme && self.host == other.host && self.port == other.port
    }

    fn segment_eq(&self, a: &str, b: &str) -> bool {
        match self.case_rule() {
            CaseRule::Sensitive => a == b,
            CaseRule::Insensitive => a.to_lowercase() == b.to_lowercase(),
        }
    }

    /// True if `ancestor` is this location or one of its ancestors.
    pub fn starts_with(&self, ancestor: &Self) -> bool {
        self.same_authority(ancestor)
            && ancestor.segments.len() <= self.segments.len()
            && ancestor
                .segments
                .iter()
                .zip(&self.segments)
                .all(|(a, b)| self.segment_eq(a, b))
    }

    /// Path part only, `/`-joined, with optional trailing separator.
    pub fn path_string(&self, trailing_separator: bool) -> String {
        let mut out = String::from("/");
        out.push_str(&self.segments.join("/"));
        if trailing_separator && !self.segments.is_empty() {
            out.push('/');
        }
        out
    }

    /// Operating-system path for `file` locations.
    pub fn native_path(&self) -> PathBuf {
        if cfg!(windows) && self.segments.first().is_some_and(|s| s.ends_with(':')) {
            let mut path = PathBuf::from(format!("{}\\", self.segments[0]));
            path.extend(&self.segments[1..]);
            path
        } else {
            let mut path = PathBuf::from("/");
            path.extend(&self.segments);
            path
        }
    }

    /// Canonical textual form.
    pub fn to_string_with(&self, include_credentials: bool, trailing_separator: bool) -> String {
        let mut out = format!("{}://", self.scheme);

        if include_credentials {
            if let Some(creds) = &self.credentials {
                out.extend(utf8_percent_encode(&creds.username, USERINFO_SET));
                if let Some(password) = &creds.password {
                    out.push(':');
                    out.extend(utf8_percent_encode(password, USERINFO_SET));
                }
                out.push('@');
            }
        }

        if let Some(host) = &self.host {
            out.push_str(host);
        }
        if let Some(port) = self.port {
            out.push_str(&format!(":{port}"));
        }

        out.push('/');
        let encoded: Vec<String> = self
            .segments
            .iter()
            .map(|s| utf8_percent_encode(s, SEGMENT_SET).to_string())
            .collect();
        out.push_str(&encoded.join("/"));
        if trailing_separator && !self.segments.is_empty() {
            out.push('/');
        }

        if let Some(query) = &self.query {
            out.push('?');
            out.push_str(query);
        }
        out
    }
}

pub(crate) fn extension_of(name: &str) -> Option<String> {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext.to_lowercase()),
        _ => None,
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.same_authority(other)
            && self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| self.segment_eq(a, b))
    }
}

impl Eq for Location {}

impl Hash for Location {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.scheme.hash(state);
        self.host.hash(state);
        self.port.hash(state);
        self.segments.len().hash(state);
        match self.case_rule() {
            CaseRule::Sensitive => self.segments.hash(state),
            CaseRule::Insensitive => {
                for s in &self.segments {
                    s.to_lowercase().hash(state);
                }
            }
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_with(false, false))
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Location({self})")
    }
}

impl std::str::FromStr for Location {
    type Err = VfaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
