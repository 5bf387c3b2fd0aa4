use indexmap::IndexMap;
use vklass_utils::regex;

use super::attributes;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FormMethod {
    Get,
    Post,
}

impl FormMethod {
    /// Anything but `GET` is submitted as a POST.
    fn from_attribute(value: Option<&str>) -> Self {
        match value {
            None => Self::Get,
            Some(value) if value.trim().eq_ignore_ascii_case("get") => Self::Get,
            Some(_) => Self::Post,
        }
    }
}

/// A form as scraped from a login page.  Used for a single submission only.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LoginForm {
    /// Raw `action` attribute; resolve it against the page URL before use.
    pub action: String,
    pub method: FormMethod,
    /// Named controls in document order.
    pub fields: IndexMap<String, String>,
}

pub trait FormParser: Send + Sync {
    fn parse_form(&self, html: &str) -> Option<LoginForm>;
}

/// Reads the first `<form>` of a page with regular expressions.
#[derive(Clone, Copy, Default, Debug)]
pub struct RegexFormParser;

impl FormParser for RegexFormParser {
    fn parse_form(&self, html: &str) -> Option<LoginForm> {
        let form = regex!(r"(?is)<form\b([^>]*)>(.*?)</form\s*>").captures(html)?;
        let form_attributes = attributes(&form[1]);

        let mut fields = IndexMap::new();
        for control in
            regex!(r"(?is)<input\b([^>]*)>|<textarea\b([^>]*)>(.*?)</textarea\s*>")
                .captures_iter(&form[2])
        {
            let (attrs, value) = match control.get(1) {
                Some(input) => {
                    let attrs = attributes(input.as_str());
                    let value = attrs.get("value").cloned().unwrap_or_default();
                    (attrs, value)
                }
                None => (
                    attributes(&control[2]),
                    control.get(3).map_or("", |m| m.as_str()).to_owned(),
                ),
            };
            if let Some(name) = attrs.get("name").filter(|name| !name.is_empty()) {
                fields.insert(name.clone(), value);
            }
        }

        Some(LoginForm {
            action: form_attributes.get("action").cloned().unwrap_or_default(),
            method: FormMethod::from_attribute(form_attributes.get("method").map(String::as_str)),
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::{FormMethod, FormParser, LoginForm, RegexFormParser};

    fn fields(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|&(k, v)| (k.to_owned(), v.to_owned()))
            .collect()
    }

    #[test]
    fn minimal_post_form() {
        let html = r#"<form action="/x" method="POST"><input name="u" value="a"><input name="p" value=""></form>"#;
        assert_eq!(
            RegexFormParser.parse_form(html),
            Some(LoginForm {
                action: "/x".to_owned(),
                method: FormMethod::Post,
                fields: fields(&[("u", "a"), ("p", "")]),
            })
        );
    }

    #[test]
    fn method_defaults_to_get() {
        let form = RegexFormParser
            .parse_form(r#"<FORM action='search'><input name=q value=rust></FORM>"#)
            .unwrap();
        assert_eq!(form.method, FormMethod::Get);
        assert_eq!(form.action, "search");
        assert_eq!(form.fields, fields(&[("q", "rust")]));
    }

    #[test]
    fn no_form_yields_none() {
        assert_eq!(RegexFormParser.parse_form("<html><body>Hi</body></html>"), None);
        assert_eq!(RegexFormParser.parse_form("<form action='/x'>unterminated"), None);
    }

    #[test]
    fn hidden_fields_textareas_and_duplicates() {
        let html = r#"
            <html><body>
            <form method="post" action="/Account/Login?ReturnUrl=%2F" class="login-form">
              <input type="hidden" name="__RequestVerificationToken" value="CfDJ8-token_==" />
              <input type="text" id="u" name="Username" autocomplete="off">
              <input value="secret" type="password" name="Password">
              <textarea name="note">line 1
line 2</textarea>
              <input type="checkbox" name="RememberMe" value="false">
              <input type="checkbox" name="RememberMe" value="true">
              <button type="submit">Logga in</button>
            </form>
            <form action="/other"><input name="ignored" value="1"></form>
            </body></html>
        "#;
        let form = RegexFormParser.parse_form(html).unwrap();
        assert_eq!(form.action, "/Account/Login?ReturnUrl=%2F");
        assert_eq!(form.method, FormMethod::Post);
        assert_eq!(
            form.fields,
            fields(&[
                ("__RequestVerificationToken", "CfDJ8-token_=="),
                ("Username", ""),
                ("Password", "secret"),
                ("note", "line 1\nline 2"),
                ("RememberMe", "true"),
            ])
        );
    }

    #[test]
    fn missing_action_is_empty() {
        let form = RegexFormParser
            .parse_form(r#"<form method="get"><input name="a" value="b"></form>"#)
            .unwrap();
        assert_eq!(form.action, "");
    }
}
