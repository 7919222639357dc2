//! SQL sanitizer
//!
//! Models often wrap their answer in a Markdown code fence even when told
//! not to. This strips one fence pair so the statement can be executed.

/// Fence info strings we treat as "this is SQL". Longest first so
/// `postgresql` is not read as `postgres` + `ql`.
const SQL_FENCE_TAGS: &[&str] = &["postgresql", "postgres", "pgsql", "psql", "sql"];

const FENCE: &str = "```";

/// Remove a leading fence opener (optionally tagged `sql`, any case) and
/// its closer, then trim surrounding whitespace.
///
/// Text after the closing fence is dropped. Sanitizing already-clean SQL
/// returns it unchanged apart from trimming, so the function is idempotent.
/// No attempt is made to check that the result is valid SQL.
pub fn sanitize_sql(raw: &str) -> String {
    let text = raw.trim();

    let Some(after_opener) = text.strip_prefix(FENCE) else {
        // No opener: only stray trailing closers can be present
        let mut text = text;
        while let Some(rest) = text.strip_suffix(FENCE) {
            text = rest.trim_end();
        }
        return text.to_string();
    };

    let body = strip_fence_tag(after_opener);
    let body = match body.find(FENCE) {
        Some(end) => &body[..end],
        None => body,
    };
    body.trim().to_string()
}

/// Strip a recognised language tag right after the opener.
fn strip_fence_tag(after_opener: &str) -> &str {
    for tag in SQL_FENCE_TAGS {
        let Some(prefix) = after_opener.get(..tag.len()) else {
            continue;
        };
        if !prefix.eq_ignore_ascii_case(tag) {
            continue;
        }
        let rest = &after_opener[tag.len()..];
        // Tag must end at a word boundary: ```sql\n or ```sql SELECT, not ```sqlite
        match rest.chars().next() {
            None => return rest,
            Some(c) if c.is_whitespace() => return rest,
            Some(_) => {}
        }
    }
    after_opener
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_sql_untouched() {
        let sql = "SELECT id, name FROM employees LIMIT 1001";
        assert_eq!(sanitize_sql(sql), sql);
    }

    #[test]
    fn test_trims_whitespace() {
        assert_eq!(sanitize_sql("\n  SELECT 1  \n"), "SELECT 1");
    }

    #[test]
    fn test_strips_sql_fence() {
        let raw = "```sql\nSELECT id FROM employees\nLIMIT 1001\n```";
        assert_eq!(sanitize_sql(raw), "SELECT id FROM employees\nLIMIT 1001");
    }

    #[test]
    fn test_fence_tag_is_case_insensitive() {
        for tag in ["sql", "SQL", "Sql", "sQl"] {
            let raw = format!("```{}\nSELECT 1\n```", tag);
            assert_eq!(sanitize_sql(&raw), "SELECT 1", "tag {}", tag);
        }
    }

    #[test]
    fn test_strips_untagged_fence() {
        assert_eq!(sanitize_sql("```\nSELECT 1\n```"), "SELECT 1");
    }

    #[test]
    fn test_postgresql_tag() {
        assert_eq!(sanitize_sql("```postgresql\nSELECT 1\n```"), "SELECT 1");
    }

    #[test]
    fn test_inline_fence() {
        assert_eq!(sanitize_sql("```sql SELECT 1```"), "SELECT 1");
    }

    #[test]
    fn test_unknown_tag_kept() {
        // Not a SQL tag, so it stays part of the body
        assert_eq!(sanitize_sql("```sqlite\nSELECT 1\n```"), "sqlite\nSELECT 1");
    }

    #[test]
    fn test_missing_closer() {
        assert_eq!(sanitize_sql("```sql\nSELECT 1"), "SELECT 1");
    }

    #[test]
    fn test_stray_closer() {
        assert_eq!(sanitize_sql("SELECT 1\n```"), "SELECT 1");
    }

    #[test]
    fn test_repeated_stray_closers() {
        assert_eq!(sanitize_sql("SELECT 1\n```\n```"), "SELECT 1");
        assert_eq!(sanitize_sql("SELECT 1``````"), "SELECT 1");
    }

    #[test]
    fn test_text_after_closer_dropped() {
        let raw = "```sql\nSELECT 1\n```\nThis query selects one.";
        assert_eq!(sanitize_sql(raw), "SELECT 1");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "SELECT 1",
            "  SELECT *\nFROM film\nLIMIT 1001 ",
            "```sql\nSELECT 1\n```",
            "```SQL\nWITH x AS (SELECT 1) SELECT * FROM x\n```",
            "```\nSELECT 'a''b'\n```",
            "SELECT 1\n```\n```",
            "```sql\nSELECT 1\n```\n```",
            "",
        ];
        for input in inputs {
            let once = sanitize_sql(input);
            assert_eq!(sanitize_sql(&once), once, "input {:?}", input);
        }
    }

    #[test]
    fn test_empty_fence() {
        assert_eq!(sanitize_sql("```sql\n```"), "");
    }
}
