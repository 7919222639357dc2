//! Read-only statement guard
//!
//! Lexical check run before generated SQL reaches the database. The
//! tokenizer understands comments (nested `/* */` and `--`), string
//! literals (`'..'`, `E'..'`, `$tag$..$tag$`) and quoted identifiers, so
//! keywords inside them are never mistaken for statement keywords.

/// Verdict for one piece of SQL text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementCheck {
    /// A single statement that only reads
    ReadOnly,
    /// Nothing but whitespace, comments or semicolons
    Empty,
    /// More than one statement separated by `;`
    MultipleStatements,
    /// The statement kind or an embedded clause would write or run DDL
    Disallowed(String),
}

/// Keywords a read-only statement may start with
const READ_ONLY_LEADING: &[&str] = &["SELECT", "WITH", "VALUES", "TABLE", "SHOW", "EXPLAIN"];

/// Statements allowed inside a CTE body that write (`WITH d AS (DELETE ...)`)
const DATA_MODIFYING: &[&str] = &["INSERT", "UPDATE", "DELETE", "MERGE"];

/// Bare options between `EXPLAIN` and the explained statement
const EXPLAIN_OPTIONS: &[&str] = &["ANALYZE", "ANALYSE", "VERBOSE"];

/// Word after `FOR` that starts a row-locking clause, and the clause
const ROW_LOCKS: &[(&str, &str)] = &[
    ("UPDATE", "FOR UPDATE"),
    ("SHARE", "FOR SHARE"),
    ("NO", "FOR NO KEY UPDATE"),
    ("KEY", "FOR KEY SHARE"),
];

/// Lexical unit of a statement. Literals, quoted identifiers, operators
/// and other punctuation produce no token.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// Bare word, upper-cased
    Word(String),
    Open,
    Close,
    Dot,
}

impl Token {
    fn word(&self) -> Option<&str> {
        match self {
            Token::Word(w) => Some(w.as_str()),
            _ => None,
        }
    }

    fn text(&self) -> &str {
        match self {
            Token::Word(w) => w.as_str(),
            Token::Open => "(",
            Token::Close => ")",
            Token::Dot => ".",
        }
    }
}

/// Classify `sql` as a single read-only statement or explain why not.
///
/// Keywords are only looked for where PostgreSQL reads a statement or
/// clause keyword, so unreserved keywords used as table or column names
/// (`FROM call c`, `m.merge`) pass.
pub fn check(sql: &str) -> StatementCheck {
    let statements = split_statements(sql);

    match statements.as_slice() {
        [] => StatementCheck::Empty,
        [tokens] => check_statement(tokens),
        _ => StatementCheck::MultipleStatements,
    }
}

fn check_statement(tokens: &[Token]) -> StatementCheck {
    let Some(leader) = statement_leader(tokens) else {
        return StatementCheck::Empty;
    };
    if !READ_ONLY_LEADING.contains(&leader) {
        return StatementCheck::Disallowed(leader.to_string());
    }

    for (i, token) in tokens.iter().enumerate() {
        let Some(word) = token.word() else {
            continue;
        };
        if i > 0 && is_label_position(&tokens[i - 1]) {
            continue;
        }
        match word {
            // Reserved, so a bare INTO is always `SELECT ... INTO t`
            "INTO" => return StatementCheck::Disallowed("SELECT INTO".to_string()),
            "FOR" => {
                let next = tokens.get(i + 1).and_then(Token::word);
                if let Some((_, clause)) = ROW_LOCKS.iter().find(|(w, _)| Some(*w) == next) {
                    return StatementCheck::Disallowed(clause.to_string());
                }
            }
            "AS" => {
                if let Some(body) = cte_body_leader(&tokens[i + 1..]) {
                    if DATA_MODIFYING.contains(&body) {
                        return StatementCheck::Disallowed(body.to_string());
                    }
                }
            }
            _ => {}
        }
    }
    StatementCheck::ReadOnly
}

/// A word right after `.` or `AS` is a name, whatever it spells.
fn is_label_position(previous: &Token) -> bool {
    match previous {
        Token::Dot => true,
        Token::Word(w) => w == "AS",
        _ => false,
    }
}

/// The keyword that decides what the statement does: the first word after
/// any opening parentheses, looking through `EXPLAIN` and its options.
fn statement_leader(tokens: &[Token]) -> Option<&str> {
    let mut rest = tokens;
    while let [Token::Open, tail @ ..] = rest {
        rest = tail;
    }
    let (first, mut rest) = rest.split_first()?;
    if first.word() != Some("EXPLAIN") {
        return Some(first.text());
    }

    loop {
        match rest {
            [Token::Open, ..] => rest = skip_group(rest),
            [Token::Word(w), tail @ ..] if EXPLAIN_OPTIONS.contains(&w.as_str()) => rest = tail,
            _ => break,
        }
    }
    statement_leader(rest).or(Some("EXPLAIN"))
}

/// Skip a parenthesised group starting at `tokens[0]`.
fn skip_group(tokens: &[Token]) -> &[Token] {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::Open => depth += 1,
            Token::Close => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return &tokens[i + 1..];
                }
            }
            _ => {}
        }
    }
    &[]
}

/// First word of a CTE body: `AS [NOT] [MATERIALIZED] ( <word>`.
fn cte_body_leader(after_as: &[Token]) -> Option<&str> {
    let rest = match after_as {
        [Token::Word(m), rest @ ..] if m == "MATERIALIZED" => rest,
        [Token::Word(n), Token::Word(m), rest @ ..] if n == "NOT" && m == "MATERIALIZED" => rest,
        _ => after_as,
    };
    match rest {
        [Token::Open, Token::Word(w), ..] => Some(w.as_str()),
        _ => None,
    }
}

/// Tokenize `sql` into statements.
///
/// Statements with no words (e.g. a trailing `;`) are dropped.
fn split_statements(sql: &str) -> Vec<Vec<Token>> {
    let bytes = sql.as_bytes();
    let len = bytes.len();
    let mut statements = Vec::new();
    let mut current: Vec<Token> = Vec::new();
    let mut i = 0;

    while i < len {
        let b = bytes[i];

        // ── Line comment: -- to end of line ──────────────────
        if b == b'-' && i + 1 < len && bytes[i + 1] == b'-' {
            while i < len && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }

        // ── Block comment, which nests in PostgreSQL ─────────
        if b == b'/' && i + 1 < len && bytes[i + 1] == b'*' {
            i = skip_block_comment(bytes, i);
            continue;
        }

        // ── String literal: 'text' with '' escape ────────────
        if b == b'\'' {
            i = skip_quoted(bytes, i, b'\'', false);
            continue;
        }

        // ── Quoted identifier: "name" with "" escape ─────────
        if b == b'"' {
            i = skip_quoted(bytes, i, b'"', false);
            continue;
        }

        // ── Dollar-quoted string or positional parameter ─────
        if b == b'$' {
            i = skip_dollar(sql, i);
            continue;
        }

        if b == b';' {
            push_statement(&mut statements, &mut current);
            i += 1;
            continue;
        }

        let punct = match b {
            b'(' => Some(Token::Open),
            b')' => Some(Token::Close),
            b'.' => Some(Token::Dot),
            _ => None,
        };
        if let Some(token) = punct {
            current.push(token);
            i += 1;
            continue;
        }

        // ── Identifier / keyword ─────────────────────────────
        if b.is_ascii_alphabetic() || b == b'_' {
            let start = i;
            while i < len && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'$')
            {
                i += 1;
            }
            let word = &sql[start..i];
            // E'...' escape string: backslash escapes apply
            if word.eq_ignore_ascii_case("e") && i < len && bytes[i] == b'\'' {
                i = skip_quoted(bytes, i, b'\'', true);
                continue;
            }
            current.push(Token::Word(word.to_ascii_uppercase()));
            continue;
        }

        // Numbers, operators, punctuation, whitespace, non-ASCII
        i += 1;
    }

    push_statement(&mut statements, &mut current);
    statements
}

fn push_statement(statements: &mut Vec<Vec<Token>>, current: &mut Vec<Token>) {
    let tokens = std::mem::take(current);
    if tokens.iter().any(|t| t.word().is_some()) {
        statements.push(tokens);
    }
}

/// Skip a `/* ... */` comment starting at `start`, honouring nesting.
/// Unterminated comments run to the end of input.
fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    let len = bytes.len();
    let mut depth = 0usize;
    let mut i = start;
    while i < len {
        if i + 1 < len && bytes[i] == b'/' && bytes[i + 1] == b'*' {
            depth += 1;
            i += 2;
        } else if i + 1 < len && bytes[i] == b'*' && bytes[i + 1] == b'/' {
            depth -= 1;
            i += 2;
            if depth == 0 {
                return i;
            }
        } else {
            i += 1;
        }
    }
    len
}

/// Skip a quoted run starting at the opening `quote`. A doubled quote is
/// an escaped quote; with `backslash_escapes`, `\x` is skipped too.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8, backslash_escapes: bool) -> usize {
    let len = bytes.len();
    let mut i = start + 1;
    while i < len {
        if backslash_escapes && bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i] == quote {
            if i + 1 < len && bytes[i + 1] == quote {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    len
}

/// Skip `$tag$ ... $tag$` (tag may be empty). `$1` style parameters and a
/// lone `$` advance one byte.
fn skip_dollar(sql: &str, start: usize) -> usize {
    let bytes = sql.as_bytes();
    let len = bytes.len();
    let mut j = start + 1;
    if j < len && bytes[j].is_ascii_digit() {
        return start + 1;
    }
    while j < len && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_') {
        j += 1;
    }
    if j >= len || bytes[j] != b'$' {
        return start + 1;
    }
    let tag = &sql[start..=j];
    match sql[j + 1..].find(tag) {
        Some(offset) => j + 1 + offset + tag.len(),
        None => len,
    }
}
