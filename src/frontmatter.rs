//! Frontmatter splitting and normalization.
//!
//! Raw YAML accepts several shapes for the same field (`availableSdks` as a
//! comma separated string or a sequence, `search` as a bool or a map). They are
//! collapsed here, once, into [`Frontmatter`] so nothing downstream has to
//! re-inspect the raw value.

use serde::Deserialize;

use crate::error::FrontmatterError;

/// SDK label used when a page does not declare its available SDKs.
pub const DEFAULT_SDK: &str = "all";

/// SDKs a logical page is available for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AvailableSdks {
    /// Explicit, ordered list from the frontmatter.
    Declared(Vec<String>),
    /// Nothing declared; the page applies to every SDK.
    #[default]
    Default,
}

impl AvailableSdks {
    /// Materializes the list stored on records.
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::Declared(sdks) => sdks.clone(),
            Self::Default => vec![DEFAULT_SDK.to_string()],
        }
    }

    /// True when the frontmatter carried an explicit list.
    pub fn is_declared(&self) -> bool {
        matches!(self, Self::Declared(_))
    }
}

/// Typed view over a document's frontmatter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frontmatter {
    /// Page title, trimmed. `None` when absent or blank.
    pub title: Option<String>,
    /// Page description.
    pub description: Option<String>,
    /// SDK this rendering of the page is scoped to.
    pub active_sdk: Option<String>,
    /// SDKs the logical page exists for.
    pub available_sdks: AvailableSdks,
    /// SDK-agnostic canonical URL template.
    pub canonical: Option<String>,
    /// Static ranking boost.
    pub page_rank: i64,
    /// `search.exclude` (or `search: false`).
    pub search_exclude: bool,
    /// Page only exists to redirect elsewhere.
    pub redirect: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFrontmatter {
    title: Option<String>,
    description: Option<String>,
    active_sdk: Option<String>,
    sdk: Option<SdkField>,
    available_sdks: Option<SdkField>,
    canonical: Option<String>,
    page_rank: Option<i64>,
    search: Option<SearchField>,
    #[serde(alias = "redirect_page")]
    redirect_page: Option<bool>,
    redirect: Option<serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SdkField {
    List(Vec<String>),
    Joined(String),
}

impl SdkField {
    fn into_list(self) -> Vec<String> {
        let items = match self {
            Self::List(items) => items,
            Self::Joined(joined) => joined.split(',').map(str::to_string).collect(),
        };
        items
            .into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchField {
    Enabled(bool),
    Options(SearchOptions),
}

#[derive(Debug, Default, Deserialize)]
struct SearchOptions {
    #[serde(default)]
    exclude: bool,
    rank: Option<i64>,
}

/// Splits a leading `---` fenced block off `source`.
///
/// Returns the YAML text (if any) and the remaining body. A block that opens
/// but never closes is an error rather than being treated as body text.
pub fn split(source: &str) -> Result<(Option<&str>, &str), FrontmatterError> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    let Some(rest) = strip_fence(source) else {
        return Ok((None, source));
    };

    let mut offset = 0usize;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Ok((Some(yaml), body));
        }
        offset += line.len();
    }
    Err(FrontmatterError::Unterminated)
}

fn strip_fence(source: &str) -> Option<&str> {
    let rest = source.strip_prefix("---")?;
    rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))
}

/// Decodes and normalizes a YAML frontmatter block.
pub fn parse(yaml: &str) -> Result<Frontmatter, FrontmatterError> {
    let raw: RawFrontmatter = if yaml.trim().is_empty() {
        RawFrontmatter::default()
    } else {
        serde_yaml::from_str(yaml)?
    };
    normalize(raw)
}

fn normalize(raw: RawFrontmatter) -> Result<Frontmatter, FrontmatterError> {
    let active_from_field = match raw.active_sdk.as_deref().map(str::trim) {
        Some(sdk) if sdk.contains(',') => {
            return Err(FrontmatterError::Field {
                field: "activeSdk",
                detail: format!("expected a single SDK, got `{sdk}`"),
            });
        }
        Some(sdk) if !sdk.is_empty() => Some(sdk.to_string()),
        _ => None,
    };

    let sdk_list = raw.sdk.map(SdkField::into_list).unwrap_or_default();
    let mut available_sdks = match raw.available_sdks.map(SdkField::into_list) {
        Some(list) if !list.is_empty() => AvailableSdks::Declared(list),
        _ => AvailableSdks::Default,
    };

    let active_sdk = match (active_from_field, sdk_list.len()) {
        (Some(sdk), _) => Some(sdk),
        (None, 1) => sdk_list.first().cloned(),
        (None, 0) => None,
        (None, _) => {
            // A multi-SDK `sdk` list scopes the logical page, not this rendering.
            if !available_sdks.is_declared() {
                available_sdks = AvailableSdks::Declared(sdk_list);
            }
            None
        }
    };

    let (search_exclude, search_rank) = match raw.search {
        Some(SearchField::Enabled(enabled)) => (!enabled, None),
        Some(SearchField::Options(options)) => (options.exclude, options.rank),
        None => (false, None),
    };

    let redirect = raw.redirect_page.unwrap_or(false)
        || raw.redirect.as_ref().is_some_and(is_truthy_redirect);

    Ok(Frontmatter {
        title: non_blank(raw.title),
        description: non_blank(raw.description),
        active_sdk,
        available_sdks,
        canonical: non_blank(raw.canonical),
        page_rank: raw.page_rank.or(search_rank).unwrap_or(0),
        search_exclude,
        redirect,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn is_truthy_redirect(value: &serde_yaml::Value) -> bool {
    match value {
        serde_yaml::Value::Null => false,
        serde_yaml::Value::Bool(flag) => *flag,
        serde_yaml::Value::String(target) => !target.trim().is_empty(),
        _ => true,
    }
}
