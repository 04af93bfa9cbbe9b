//! # Pattern Classifier
//!
//! Labels the engine's terminal output with an ordered list of anchored
//! rules. The first rule whose pattern matches at the start of the buffer
//! wins; its action decides how many bytes the match consumes.
//!
//! ## Goal rules (precedence order)
//!
//! | # | Category | Pattern | Action |
//! |---|----------|---------|--------|
//! | 1 | `Prompt` | `^\?- ` | matched only |
//! | 2 | `WantMore` | `^;` | matched only |
//! | 3 | `False` | `^\s+false\.[\r\n]` | whole buffer |
//! | 4 | `True` | `^\s+true\.[\r\n]` | whole buffer |
//! | 5 | `Error` | `^\s+error\(.+?\)\.[\r\n]` | whole buffer |
//! | 6 | `Result` | `^\s+[A-Z_][^ ]* = ...[\r\n]` | whole buffer |
//! | 7 | `EchoGoal` | `^[a-z][^(\r\n]*\(.*?\)\.[\r\n]` | skip to newline |
//! | 8 | `EchoConsult` | `^\[[^\]]+\]\.[\r\n]` | skip to newline |
//! | 9 | `Message` | `^.*?[\r\n]` | whole buffer |
//!
//! "Whole buffer" hands back everything read so far, so a result line and
//! the prompt that followed it in the same read arrive together and the
//! caller can see that the engine is already idle again.

use regex::bytes::Regex;
use std::fmt;
use std::sync::LazyLock;

/// What a chunk of engine output means
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Idle prompt `?- `
    Prompt,
    /// Bare `;` asking whether to backtrack
    WantMore,
    False,
    True,
    /// `error(...)` term
    Error,
    /// `Name = Value` bindings
    Result,
    /// The terminal echoing a goal back
    EchoGoal,
    /// The terminal echoing a consult directive back
    EchoConsult,
    /// Any other complete line
    Message,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Prompt => "prompt",
            Category::WantMore => "want-more",
            Category::False => "false",
            Category::True => "true",
            Category::Error => "error",
            Category::Result => "result",
            Category::EchoGoal => "goal echo",
            Category::EchoConsult => "consult echo",
            Category::Message => "message",
        };
        f.write_str(name)
    }
}

/// How much of the buffer a match consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Everything currently buffered
    Whole,
    /// Only the matched bytes
    MatchedOnly,
    /// The match, then through the next occurrence of the byte
    SkipTill(u8),
}

/// A pattern with the category it signals
#[derive(Debug, Clone)]
pub struct Rule {
    pub category: Category,
    pub pattern: Regex,
    pub action: Action,
}

impl Rule {
    fn new(category: Category, pattern: &str, action: Action) -> Self {
        Rule {
            category,
            pattern: Regex::new(pattern).expect("classifier patterns are valid"),
            action,
        }
    }

    /// Number of bytes consumed if this rule matches at the buffer start.
    fn consumed(&self, buffer: &[u8]) -> Option<usize> {
        let m = self.pattern.find(buffer)?;
        if m.start() != 0 {
            return None;
        }
        let end = match self.action {
            Action::Whole => buffer.len(),
            Action::MatchedOnly => m.end(),
            Action::SkipTill(byte) => {
                let from = m.end().saturating_sub(1);
                buffer[from..]
                    .iter()
                    .position(|b| *b == byte)
                    .map_or(m.end(), |pos| from + pos + 1)
            }
        };
        Some(end)
    }
}

/// An ordered list of rules; earlier rules take precedence
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

/// Outcome of classifying a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classified {
    pub category: Category,
    /// Bytes to remove from the front of the buffer
    pub consumed: usize,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        RuleSet { rules }
    }

    /// Classify the front of `buffer`, or `None` if no rule matches yet.
    pub fn classify(&self, buffer: &[u8]) -> Option<Classified> {
        self.rules.iter().find_map(|rule| {
            rule.consumed(buffer).map(|consumed| Classified {
                category: rule.category,
                consumed,
            })
        })
    }

    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.rules.iter().map(|rule| rule.category)
    }
}

const PROMPT: &str = r"^\?- ";
const WANT_MORE: &str = r"^;";
const FALSE: &str = r"^\s+false\.[\r\n]";
const TRUE: &str = r"^\s+true\.[\r\n]";
const ERROR: &str = r"^\s+error\(.+?\)\.[\r\n]";
const RESULT: &str = r"^\s+[A-Z_][^ ]* = [^ ]+?([^\r\n])*[\r\n]";
const ECHO_GOAL: &str = r"^[a-z][^(\r\n]*\(.*?\)\.[\r\n]";
const ECHO_CONSULT: &str = r"^\[[^\]]+\]\.[\r\n]";
const MESSAGE: &str = r"^.*?[\r\n]";

/// Rules used while a goal is being proved
pub static GOAL_RULES: LazyLock<RuleSet> = LazyLock::new(|| {
    RuleSet::new(vec![
        Rule::new(Category::Prompt, PROMPT, Action::MatchedOnly),
        Rule::new(Category::WantMore, WANT_MORE, Action::MatchedOnly),
        Rule::new(Category::False, FALSE, Action::Whole),
        Rule::new(Category::True, TRUE, Action::Whole),
        Rule::new(Category::Error, ERROR, Action::Whole),
        Rule::new(Category::Result, RESULT, Action::Whole),
        Rule::new(Category::EchoGoal, ECHO_GOAL, Action::SkipTill(b'\n')),
        Rule::new(Category::EchoConsult, ECHO_CONSULT, Action::SkipTill(b'\n')),
        Rule::new(Category::Message, MESSAGE, Action::Whole),
    ])
});

/// Rules used while a file is being consulted
pub static CONSULT_RULES: LazyLock<RuleSet> = LazyLock::new(|| {
    RuleSet::new(vec![
        Rule::new(Category::Prompt, PROMPT, Action::MatchedOnly),
        Rule::new(Category::True, TRUE, Action::Whole),
        Rule::new(Category::Error, ERROR, Action::Whole),
        Rule::new(Category::EchoConsult, ECHO_CONSULT, Action::SkipTill(b'\n')),
        Rule::new(Category::EchoGoal, ECHO_GOAL, Action::SkipTill(b'\n')),
        Rule::new(Category::Message, MESSAGE, Action::Whole),
    ])
});

static PROMPT_ANYWHERE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\?- ").expect("prompt pattern is valid"));

/// Bytes up to and including the first idle prompt, discarding any banner.
pub fn find_prompt(buffer: &[u8]) -> Option<usize> {
    PROMPT_ANYWHERE.find(buffer).map(|m| m.end())
}

/// First line of an error chunk, trimmed.
pub fn extract_error(text: &str) -> &str {
    text.split('\n').next().unwrap_or(text).trim()
}

/// Parts of a `Message` chunk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageParts<'a> {
    /// Complete diagnostic lines
    pub text: &'a str,
    /// Last line, which may carry an outcome such as ` true.`
    pub tail: &'a str,
    /// Trailing `?- ` prompt or bare `;`
    pub cue: &'a str,
}

/// Split a message chunk into diagnostic text, trailing fragment and cue.
pub fn extract_message(chunk: &str) -> MessageParts<'_> {
    let Some(pos) = chunk.rfind('\n') else {
        return MessageParts {
            text: chunk,
            ..MessageParts::default()
        };
    };

    let (msg, last) = chunk.split_at(pos + 1);
    if !last.is_empty() && !last.starts_with("?- ") && last != ";" {
        return MessageParts {
            text: msg,
            tail: last,
            cue: "",
        };
    }

    match msg[..msg.len() - 1].rfind('\n') {
        Some(inner) => {
            let (text, tail) = msg.split_at(inner + 1);
            MessageParts { text, tail, cue: last }
        }
        None => MessageParts {
            text: msg,
            tail: "",
            cue: last,
        },
    }
}

/// Classify the trailing fragment of a message chunk as a line of its own.
///
/// The fragment is re-indented and newline-terminated first, so an outcome
/// such as `true.` is recognised however the read split it.
pub fn classify_tail(rules: &RuleSet, tail: &str) -> Option<Category> {
    let tail = tail.trim();
    if tail.is_empty() {
        return None;
    }
    let line = format!("   {tail}\n");
    rules.classify(line.as_bytes()).map(|c| c.category)
}

/// Whether the chunk ends with the idle prompt.
pub fn ends_at_prompt(text: &str) -> bool {
    text.ends_with("?- ")
}

/// Whether the chunk ends with a backtracking cue.
pub fn awaits_more(text: &str) -> bool {
    text.ends_with(';')
}
