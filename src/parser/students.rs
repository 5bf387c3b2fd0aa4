use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use regex::Regex;
use vklass_utils::regex;

use crate::schema::{StudentId, StudentRoster, MIN_STUDENT_ID_LEN};

/// Largest distance (in characters) between an id and text taken to be its name.
const NEARBY_TEXT_WINDOW: usize = 120;

pub trait StudentScraper: Send + Sync {
    /// Ids referenced by `studentId=` / `studentIds=` query parameters.
    fn student_ids(&self, html: &str) -> BTreeSet<StudentId>;

    /// Names for every id returned by [`StudentScraper::student_ids`].
    /// Never fails; an id whose name cannot be found names itself.
    fn roster(&self, html: &str) -> StudentRoster;
}

/// Recovers names from the welcome page with a cascade of guesses,
/// from the most to the least reliable.  A name found by an earlier
/// guess is never replaced by a later one.
#[derive(Clone, Copy, Default, Debug)]
pub struct HeuristicStudentScraper;

impl StudentScraper for HeuristicStudentScraper {
    fn student_ids(&self, html: &str) -> BTreeSet<StudentId> {
        regex!(r"(?i)studentIds?=([0-9,]+)")
            .captures_iter(html)
            .flat_map(|captures| {
                split_ids(captures.get(1).map_or("", |m| m.as_str()))
                    .filter(|id| id.len() >= MIN_STUDENT_ID_LEN)
                    .map(StudentId::from)
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn roster(&self, html: &str) -> StudentRoster {
        let ids = self.student_ids(html);
        let mut names = BTreeMap::<String, String>::new();

        names_from_options(html, &mut names);
        names_from_data_attributes(html, &mut names);
        names_from_headings(html, &mut names);

        ids.into_iter()
            .map(|id| {
                let name = match names.get(id.as_str()) {
                    Some(name) => name.clone(),
                    None => name_near_id(html, id.as_str()).unwrap_or_else(|| {
                        debug!("No name found for student {id}");
                        id.to_string()
                    }),
                };
                (id, name)
            })
            .collect::<BTreeMap<_, _>>()
            .into()
    }
}

fn split_ids(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|id| !id.is_empty())
}

fn insert_name(names: &mut BTreeMap<String, String>, id: &str, raw: &str) {
    let name = clean_text(raw);
    if !name.is_empty() {
        names.entry(id.to_owned()).or_insert(name);
    }
}

/// `<option value="id">Name</option>`
fn names_from_options(html: &str, names: &mut BTreeMap<String, String>) {
    for captures in
        regex!(r#"(?i)<option[^>]*value=["']?(\d+)["']?[^>]*>([^<]+)</option>"#).captures_iter(html)
    {
        insert_name(names, &captures[1], &captures[2]);
    }
}

/// `<span data-student-id="id">Name</span>`
fn names_from_data_attributes(html: &str, names: &mut BTreeMap<String, String>) {
    for captures in regex!(r#"(?i)data-student-id=["']?(\d+)["']?[^>]*>([^<]+)<"#).captures_iter(html)
    {
        insert_name(names, &captures[1], &captures[2]);
    }
}

/// Links carrying `studentIds=` are named after the closest `<h2>` above them.
fn names_from_headings(html: &str, names: &mut BTreeMap<String, String>) {
    let headings = regex!(r"(?i)<h2[^>]*>([^<]+)</h2>")
        .captures_iter(html)
        .filter_map(|captures| {
            let whole = captures.get(0)?;
            Some((whole.start(), captures.get(1)?.as_str()))
        })
        .collect::<Vec<_>>();
    for anchor in regex!(r#"(?is)<a[^>]+href=["'][^"']*studentIds=([0-9,]+)[^"']*["'][^>]*>.*?</a>"#)
        .captures_iter(html)
    {
        let Some(start) = anchor.get(0).map(|m| m.start()) else {
            continue;
        };
        let Some(&(_, heading)) = headings.iter().rev().find(|&&(pos, _)| pos < start) else {
            continue;
        };
        for id in split_ids(&anchor[1]) {
            insert_name(names, id, heading);
        }
    }
}

/// Last resort for an id none of the structured patterns could name.
fn name_near_id(html: &str, id: &str) -> Option<String> {
    let id_pattern = regex::escape(id);
    name_from_element_attribute(html, &id_pattern)
        .or_else(|| name_from_link(html, &id_pattern))
        .or_else(|| name_from_surrounding_text(html, id))
        .or_else(|| name_from_title_or_alt(html, &id_pattern))
}

/// An element with the id inside `value`, `data-student-id`, `data-id` or `href`,
/// whose whole content is a short text.
fn name_from_element_attribute(html: &str, id_pattern: &str) -> Option<String> {
    let pattern = Regex::new(&format!(
        r#"(?i)<([a-zA-Z0-9]+)[^>]*?(?:value|data-student-id|data-id|href)=["']?[^"'>]*{id_pattern}[^"'>]*["']?[^>]*>([^<]{{1,120}})</([a-zA-Z0-9]+)>"#
    ))
    .ok()?;
    // Only accept a closing tag that matches the opening one
    let name = pattern
        .captures_iter(html)
        .filter(|captures| captures[1].eq_ignore_ascii_case(&captures[3]))
        .map(|captures| clean_text(&captures[2]))
        .find(|name| !name.is_empty());
    name
}

fn name_from_link(html: &str, id_pattern: &str) -> Option<String> {
    let pattern = Regex::new(&format!(
        r#"(?i)<a[^>]+href=["'][^"']*{id_pattern}[^"']*["'][^>]*>([^<]{{1,120}})</a>"#
    ))
    .ok()?;
    let name = pattern
        .captures_iter(html)
        .map(|captures| clean_text(&captures[1]))
        .find(|name| !name.is_empty());
    name
}

/// The text node around the first occurrence of the id, if it reads like a name.
fn name_from_surrounding_text(html: &str, id: &str) -> Option<String> {
    let pos = html.find(id)?;
    let window_start = html[..pos]
        .char_indices()
        .rev()
        .take(NEARBY_TEXT_WINDOW)
        .last()
        .map_or(pos, |(i, _)| i);
    let window_end = html[pos..]
        .char_indices()
        .nth(NEARBY_TEXT_WINDOW)
        .map_or(html.len(), |(i, _)| pos + i);

    let text_start = html[window_start..pos].rfind('>')? + window_start + 1;
    let text_end = html[pos..window_end].find('<')? + pos;
    let text = clean_text(&html[text_start..text_end]);
    let looks_like_name = text.chars().any(char::is_alphabetic)
        && !text.chars().all(|c| c.is_ascii_digit())
        && text.chars().count() < NEARBY_TEXT_WINDOW;
    looks_like_name.then_some(text)
}

fn name_from_title_or_alt(html: &str, id_pattern: &str) -> Option<String> {
    let pattern = Regex::new(&format!(
        r#"(?is){id_pattern}.{{0,100}}?(?:alt|title)=["']([^"']{{1,80}})["']"#
    ))
    .ok()?;
    let captures = pattern.captures(html)?;
    Some(clean_text(&captures[1])).filter(|name| !name.is_empty())
}

/// Trims, collapses runs of whitespace and decodes the common character references.
fn clean_text(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    regex!(r"&(?:#([0-9]{1,7})|#[xX]([0-9a-fA-F]{1,6})|(amp|lt|gt|quot|apos|nbsp));")
        .replace_all(&collapsed, |captures: &regex::Captures| {
            let decoded = if let Some(dec) = captures.get(1) {
                dec.as_str().parse().ok().and_then(char::from_u32)
            } else if let Some(hex) = captures.get(2) {
                u32::from_str_radix(hex.as_str(), 16)
                    .ok()
                    .and_then(char::from_u32)
            } else {
                match &captures[3] {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    _ => Some(' '),
                }
            };
            decoded.map_or_else(|| captures[0].to_owned(), String::from)
        })
        .trim()
        .to_owned()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{clean_text, HeuristicStudentScraper, StudentScraper};
    use crate::schema::StudentId;

    fn roster(html: &str) -> BTreeMap<String, String> {
        HeuristicStudentScraper
            .roster(html)
            .iter()
            .map(|(id, name)| (id.to_string(), name.clone()))
            .collect()
    }

    fn expected(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|&(k, v)| (k.to_owned(), v.to_owned()))
            .collect()
    }

    #[test]
    fn ids_are_sorted_deduplicated_and_long_enough() {
        let html = r#"
            <a href="/Events?studentIds=222222,111111">x</a>
            <a href="/Grades?studentId=111111">y</a>
            <a href="/Other?STUDENTIDS=12345, 333333">z</a>
        "#;
        let ids = HeuristicStudentScraper.student_ids(html);
        assert_eq!(
            ids.into_iter().collect::<Vec<_>>(),
            ["111111", "222222"].map(StudentId::from)
        );
    }

    #[test]
    fn option_names_win() {
        let html = r#"
            <select><option value="123456">Alice Andersson</option></select>
            <span data-student-id="123456">Someone Else</span>
            <a href="/x?studentId=123456">link</a>
        "#;
        assert_eq!(roster(html), expected(&[("123456", "Alice Andersson")]));
    }

    #[test]
    fn data_attribute_names() {
        let html = r#"
            <div class="student" data-student-id="654321" title="card">  Bertil  Berg </div>
            <a href="/x?studentId=654321"></a>
        "#;
        assert_eq!(roster(html), expected(&[("654321", "Bertil Berg")]));
    }

    #[test]
    fn heading_before_link_names_every_id_in_it() {
        let html = r#"
            <h2>Unrelated</h2>
            <div>
              <h2 class="name">Cecilia Carlsson</h2>
              <a class="btn" href="/Events/Calendar?studentIds=111111,222222">
                <span>Kalender</span>
              </a>
            </div>
            <h2>Footer</h2>
        "#;
        assert_eq!(
            roster(html),
            expected(&[("111111", "Cecilia Carlsson"), ("222222", "Cecilia Carlsson")])
        );
    }

    #[test]
    fn element_with_id_in_attribute() {
        let html = r#"
            <li data-id="student-777777">Doris Dahl</li>
            <p>studentId=777777</p>
        "#;
        assert_eq!(roster(html), expected(&[("777777", "Doris Dahl")]));
    }

    #[test]
    fn mismatched_closing_tag_is_skipped() {
        let html = r#"
            <b data-id="888888">Wrong</i>
            <span data-id="888888">Erik Ek</span>
            <p>studentId=888888</p>
        "#;
        assert_eq!(roster(html), expected(&[("888888", "Erik Ek")]));
    }

    #[test]
    fn link_text() {
        let html = r#"<a class="student" href="/Student/Profile/313131">Ivar Isaksson</a> studentIds=313131"#;
        assert_eq!(roster(html), expected(&[("313131", "Ivar Isaksson")]));
    }

    #[test]
    fn surrounding_text() {
        let html = r#"<p>Frida Fors 999999</p><a href="/x?studentId=999999"></a>"#;
        assert_eq!(roster(html), expected(&[("999999", "Frida Fors 999999")]));
    }

    #[test]
    fn surrounding_text_must_contain_letters() {
        let html = r#"<td>999999</td><a href="/x?studentId=999999"></a>"#;
        assert_eq!(roster(html), expected(&[("999999", "999999")]));
    }

    #[test]
    fn title_attribute_after_id() {
        let html = r#"<img data-ref="studentId=424242" src="a.png" title="Gustav Gran">"#;
        assert_eq!(roster(html), expected(&[("424242", "Gustav Gran")]));
    }

    #[test]
    fn unresolved_id_names_itself() {
        let html = r#"<input type="hidden" value="studentIds=505050,606060">"#;
        assert_eq!(
            roster(html),
            expected(&[("505050", "505050"), ("606060", "606060")])
        );
    }

    #[test]
    fn roster_keys_equal_discovered_ids() {
        let html = r#"
            <option value="1234567">Not A Student</option>
            <a href="/x?studentIds=7654321">Hanna</a>
        "#;
        let roster = HeuristicStudentScraper.roster(html);
        let ids = HeuristicStudentScraper.student_ids(html);
        assert_eq!(roster.ids().cloned().collect::<Vec<_>>(), ids.into_iter().collect::<Vec<_>>());
        assert!(roster.values().all(|name| !name.is_empty()));
        assert_eq!(roster.get(&StudentId::from("7654321")).unwrap(), "Hanna");
    }

    #[test]
    fn empty_page() {
        assert!(HeuristicStudentScraper.roster("").is_empty());
    }

    #[test]
    fn text_is_cleaned() {
        assert_eq!(clean_text("  &#197;sa\n  &#xF6;berg &amp; Co&nbsp; "), "Åsa öberg & Co");
        assert_eq!(clean_text("&bogus; &#xFFFFFF;"), "&bogus; &#xFFFFFF;");
    }
}
