//! Pattern-based readers for the portal's HTML.
//!
//! Both readers sit behind small traits so that the heuristics can be
//! swapped out without touching the session layer.

pub mod login_form;
pub mod students;

use indexmap::IndexMap;
use vklass_utils::regex;

/// Attributes of a start tag, keyed by lower-cased name.  The first occurrence wins, as in browsers.
pub(crate) fn attributes(tag_body: &str) -> IndexMap<String, String> {
    let mut attributes = IndexMap::new();
    for captures in regex!(r#"(?s)([^\s"'<>/=]+)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .captures_iter(tag_body)
    {
        let name = captures[1].to_ascii_lowercase();
        let value = captures
            .get(2)
            .or_else(|| captures.get(3))
            .or_else(|| captures.get(4))
            .map_or("", |m| m.as_str());
        attributes.entry(name).or_insert_with(|| value.to_owned());
    }
    attributes
}
