/// Represents ways to locate an element in the portal's document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Select by `id` attribute
    Id(String),
    /// Select by `name` attribute
    Name(String),
    /// Select by a single CSS class
    ClassName(String),
    /// Raw CSS selector
    Css(String),
    /// Raw XPath expression
    XPath(String),
    /// Anchor whose visible text equals the value
    LinkText(String),
    /// Anchor whose visible text contains the value
    PartialLinkText(String),
    /// Select by tag name (e.g. `iframe`)
    TagName(String),
    /// Any element whose own text contains the value
    Text(String),
    /// Represents an invalid selector string, with a reason.
    Invalid(String),
}

/// W3C WebDriver locator strategy names.
pub const CSS_STRATEGY: &str = "css selector";
pub const XPATH_STRATEGY: &str = "xpath";
pub const LINK_TEXT_STRATEGY: &str = "link text";
pub const PARTIAL_LINK_TEXT_STRATEGY: &str = "partial link text";
pub const TAG_NAME_STRATEGY: &str = "tag name";

impl Selector {
    /// Lower this selector to a WebDriver `(using, value)` pair.
    pub fn to_webdriver(&self) -> Result<(&'static str, String), String> {
        match self {
            Selector::Id(id) => Ok((CSS_STRATEGY, format!("[id={}]", css_string(id)))),
            Selector::Name(name) => Ok((CSS_STRATEGY, format!("[name={}]", css_string(name)))),
            Selector::ClassName(class) => Ok((CSS_STRATEGY, format!(".{}", class.trim()))),
            Selector::Css(css) => Ok((CSS_STRATEGY, css.clone())),
            Selector::XPath(xpath) => Ok((XPATH_STRATEGY, xpath.clone())),
            Selector::LinkText(text) => Ok((LINK_TEXT_STRATEGY, text.clone())),
            Selector::PartialLinkText(text) => Ok((PARTIAL_LINK_TEXT_STRATEGY, text.clone())),
            Selector::TagName(tag) => Ok((TAG_NAME_STRATEGY, tag.clone())),
            Selector::Text(text) => Ok((
                XPATH_STRATEGY,
                format!("//*[contains(text(), {})]", xpath_literal(text)),
            )),
            Selector::Invalid(reason) => Err(reason.clone()),
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Id(v) => write!(f, "id:{v}"),
            Selector::Name(v) => write!(f, "name:{v}"),
            Selector::ClassName(v) => write!(f, "class:{v}"),
            Selector::Css(v) => write!(f, "css:{v}"),
            Selector::XPath(v) => write!(f, "{v}"),
            Selector::LinkText(v) => write!(f, "link:{v}"),
            Selector::PartialLinkText(v) => write!(f, "partial:{v}"),
            Selector::TagName(v) => write!(f, "tag:{v}"),
            Selector::Text(v) => write!(f, "text:{v}"),
            Selector::Invalid(v) => write!(f, "invalid:{v}"),
        }
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        let s = s.trim();
        let lower = s.to_lowercase();

        match s {
            _ if s.is_empty() => Selector::Invalid("Empty selector".to_string()),
            // XPath is the only format allowed to start with '/' or '('
            _ if s.starts_with('/') || s.starts_with('(') => Selector::XPath(s.to_string()),
            _ if s.starts_with('#') => Selector::Id(s[1..].to_string()),
            _ if lower.starts_with("id:") => Selector::Id(s[3..].trim().to_string()),
            _ if lower.starts_with("name:") => Selector::Name(s[5..].trim().to_string()),
            _ if lower.starts_with("classname:") => {
                Selector::ClassName(s["classname:".len()..].trim().to_string())
            }
            _ if lower.starts_with("class:") => Selector::ClassName(s[6..].trim().to_string()),
            _ if lower.starts_with("css:") => Selector::Css(s[4..].trim().to_string()),
            _ if lower.starts_with("xpath:") => Selector::XPath(s[6..].trim().to_string()),
            _ if lower.starts_with("link:") => Selector::LinkText(s[5..].to_string()),
            _ if lower.starts_with("partial:") => Selector::PartialLinkText(s[8..].to_string()),
            _ if lower.starts_with("tag:") => Selector::TagName(s[4..].trim().to_string()),
            _ if lower.starts_with("text:") => Selector::Text(s[5..].to_string()),
            _ => Selector::Invalid(format!(
                "Unknown selector format: \"{s}\". Use prefixes like 'id:', 'name:', 'class:', 'css:', 'link:', 'partial:', 'tag:', 'text:' or an XPath starting with '/'."
            )),
        }
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}

/// Quote a string for use inside an XPath expression.
///
/// XPath 1.0 has no escape sequences, so text containing both quote kinds
/// has to be stitched together with `concat()`.
pub fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        return format!("'{text}'");
    }
    if !text.contains('"') {
        return format!("\"{text}\"");
    }
    let parts: Vec<String> = text
        .split('\'')
        .map(|part| format!("'{part}'"))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

fn css_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_selectors() {
        assert_eq!(Selector::from("id:certLogin"), Selector::Id("certLogin".into()));
        assert_eq!(Selector::from("#logoutBtn"), Selector::Id("logoutBtn".into()));
        assert_eq!(Selector::from("name:password"), Selector::Name("password".into()));
        assert_eq!(
            Selector::from("class:cert-login"),
            Selector::ClassName("cert-login".into())
        );
        assert_eq!(Selector::from("link:청구관리"), Selector::LinkText("청구관리".into()));
        assert_eq!(Selector::from("tag:iframe"), Selector::TagName("iframe".into()));
        assert_eq!(Selector::from("text:로그아웃"), Selector::Text("로그아웃".into()));
    }

    #[test]
    fn test_xpath_selectors() {
        let selector = Selector::from("//a[contains(text(), '공동인증서')]");
        assert_eq!(
            selector,
            Selector::XPath("//a[contains(text(), '공동인증서')]".into())
        );
        assert_eq!(
            selector.to_webdriver().unwrap(),
            (XPATH_STRATEGY, "//a[contains(text(), '공동인증서')]".to_string())
        );
    }

    #[test]
    fn test_unknown_format_is_invalid() {
        assert!(matches!(Selector::from("button"), Selector::Invalid(_)));
        assert!(matches!(Selector::from("   "), Selector::Invalid(_)));
        assert!(Selector::from("button").to_webdriver().is_err());
    }

    #[test]
    fn test_attribute_selectors_lower_to_css() {
        assert_eq!(
            Selector::Id("startDate".into()).to_webdriver().unwrap(),
            (CSS_STRATEGY, "[id=\"startDate\"]".to_string())
        );
        assert_eq!(
            Selector::Name("uploadFile".into()).to_webdriver().unwrap(),
            (CSS_STRATEGY, "[name=\"uploadFile\"]".to_string())
        );
    }

    #[test]
    fn test_xpath_literal_quoting() {
        assert_eq!(xpath_literal("조회"), "'조회'");
        assert_eq!(xpath_literal("it's"), "\"it's\"");
        assert_eq!(
            xpath_literal("a'b\"c"),
            "concat('a', \"'\", 'b\"c')"
        );
    }

    #[test]
    fn test_display_round_trips_prefixed_forms() {
        for raw in ["id:a", "name:b", "class:c", "link:d", "tag:iframe", "text:e"] {
            assert_eq!(Selector::from(raw).to_string(), raw);
        }
    }
}
