//! Minimal RFC 4180 writer for the two report tables.

use std::borrow::Cow;

use seocompass_shared::{Competitor, Keyword};

const LINE_END: &str = "\r\n";

/// `competitors.csv`: `rank,url,keyword,estimated_traffic`.
pub fn competitors_csv(items: &[Competitor]) -> String {
    let mut out = String::new();
    push_row(&mut out, &["rank", "url", "keyword", "estimated_traffic"]);
    for c in items {
        push_row(
            &mut out,
            &[
                &c.rank.to_string(),
                &c.url,
                &c.keyword,
                &c.estimated_traffic.to_string(),
            ],
        );
    }
    out
}

/// `keywords.csv`: `keyword,search_volume,difficulty`.
pub fn keywords_csv(items: &[Keyword]) -> String {
    let mut out = String::new();
    push_row(&mut out, &["keyword", "search_volume", "difficulty"]);
    for k in items {
        push_row(
            &mut out,
            &[
                &k.keyword,
                &k.search_volume.to_string(),
                // `Debug` keeps the decimal point on whole numbers (1.0, not 1)
                &format!("{:?}", k.difficulty),
            ],
        );
    }
    out
}

fn push_row(out: &mut String, fields: &[&str]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape(field));
    }
    out.push_str(LINE_END);
}

/// Quote a field containing a delimiter, quote or line break; double inner quotes.
fn escape(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\r', '\n']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_quotes_only_when_needed() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a,b"), "\"a,b\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn keywords_table() {
        let csv = keywords_csv(&[
            Keyword {
                keyword: "seo optimization".into(),
                search_volume: 4_200,
                difficulty: 0.45,
            },
            Keyword {
                keyword: "hard, term".into(),
                search_volume: 10,
                difficulty: 1.0,
            },
        ]);
        assert_eq!(
            csv,
            "keyword,search_volume,difficulty\r\n\
             seo optimization,4200,0.45\r\n\
             \"hard, term\",10,1.0\r\n"
        );
    }

    #[test]
    fn empty_tables_keep_header() {
        assert_eq!(competitors_csv(&[]), "rank,url,keyword,estimated_traffic\r\n");
    }
}
