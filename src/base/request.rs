//! Request-side core types.
//!
//! The identifiers and decision codes shared by the decision cache, the
//! journal and the filtering-engine collaborator.

use crate::base::error::GuardError;
use std::fmt;

/// Opaque tab handle.
///
/// Negative values denote background or non-tab contexts; sessions bound to
/// them are excluded from domain membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TabId(pub i64);

impl TabId {
    /// Whether this id refers to a real, user-visible tab.
    pub fn is_real_tab(self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<i64> for TabId {
    fn from(value: i64) -> Self {
        TabId(value)
    }
}

/// Network request types, matching the platform's resource-type vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    Script,
    Image,
    Stylesheet,
    SubFrame,
    Font,
    Media,
    Object,
    Xhr,
    CspReport,
    Websocket,
    Other,
}

impl RequestType {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestType::Script => "script",
            RequestType::Image => "image",
            RequestType::Stylesheet => "stylesheet",
            RequestType::SubFrame => "sub_frame",
            RequestType::Font => "font",
            RequestType::Media => "media",
            RequestType::Object => "object",
            RequestType::Xhr => "xmlhttprequest",
            RequestType::CspReport => "csp_report",
            RequestType::Websocket => "websocket",
            RequestType::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Result<Self, GuardError> {
        Ok(match value {
            "script" => RequestType::Script,
            "image" | "imageset" => RequestType::Image,
            "stylesheet" => RequestType::Stylesheet,
            "sub_frame" | "subdocument" => RequestType::SubFrame,
            "font" => RequestType::Font,
            "media" => RequestType::Media,
            "object" | "object_subrequest" => RequestType::Object,
            "xmlhttprequest" => RequestType::Xhr,
            "csp_report" => RequestType::CspReport,
            "websocket" => RequestType::Websocket,
            "other" | "beacon" | "ping" => RequestType::Other,
            unknown => return Err(GuardError::UnknownRequestType(unknown.to_string())),
        })
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome code of a single evaluation stage.
///
/// `None` and `Noop` are the neutral codes: a stage returning either defers
/// to the next stage in the precedence chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchCode {
    /// No rule matched.
    #[default]
    None,
    /// A block rule matched.
    Blocked,
    /// An exception (allow) rule matched.
    Allowed,
    /// A rule matched but explicitly defers to lower-precedence stages.
    Noop,
}

impl MatchCode {
    /// Whether this code lets the next precedence stage run.
    pub fn is_neutral(self) -> bool {
        matches!(self, MatchCode::None | MatchCode::Noop)
    }
}

/// Reference to the filter list(s) that produced a match.
///
/// A static-list match usually carries a single list path; merged rules may
/// carry several.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterRef {
    pub paths: Vec<String>,
}

impl FilterRef {
    pub fn single(path: impl Into<String>) -> Self {
        FilterRef { paths: vec![path.into()] }
    }
}

/// Result of a filtering evaluation: the decision code plus the matched
/// filter reference, if any.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchResult {
    pub code: MatchCode,
    pub filter: Option<FilterRef>,
}

impl MatchResult {
    pub fn code(code: MatchCode) -> Self {
        MatchResult { code, filter: None }
    }

    /// The "not filtered" result returned when filtering is off or paused.
    pub fn not_filtered() -> Self {
        MatchResult::default()
    }

    pub fn is_blocked(&self) -> bool {
        self.code == MatchCode::Blocked
    }
}

/// Everything the filtering pipeline needs to know about one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Hostname of the tab's root document.
    pub root_hostname: String,
    /// Root domain (public-suffix-aware) of the tab's root document.
    pub root_domain: String,
    /// Hostname of the frame the request originates from.
    pub page_hostname: String,
    /// Root domain of the originating frame.
    pub page_domain: String,
    pub request_type: RequestType,
    pub request_url: String,
    pub request_hostname: String,
}

impl RequestContext {
    /// Cache key for this request: origin hostname, type and URL separated
    /// by single spaces. The decision cache's blocked index relies on the
    /// hostname being the first space-delimited token.
    pub fn cache_key(&self) -> String {
        format!(
            "{} {} {}",
            self.page_hostname,
            self.request_type.as_str(),
            self.request_url
        )
    }
}

/// Unix timestamp in milliseconds, for "content modified" stamps exposed to
/// polling display layers.
pub fn now_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Strip query and fragment from a URL, for URL-scoped exception lookups.
pub fn url_without_params(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.into()
        }
        Err(_) => raw
            .split(['?', '#'])
            .next()
            .unwrap_or(raw)
            .to_string(),
    }
}
