//! TextFSM template definitions.
//!
//! A template is a block of `Value` lines, a blank line, then named states
//! made of `^regex -> Action` rules. The regex of each value becomes a
//! capture group wherever a rule mentions `${Name}` or `$Name`.

use indexmap::IndexMap;
use regex::Regex;

use crate::error::TemplateError;

type Result<T> = std::result::Result<T, TemplateError>;

/// Reserved state names that end processing.
pub(crate) const END_STATE: &str = "End";
pub(crate) const EOF_STATE: &str = "EOF";

/// Options attached to a `Value`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValueOptions {
    /// Keep the value across records until overwritten.
    pub filldown: bool,

    /// Copy the value back into earlier records that lack it.
    pub fillup: bool,

    /// Drop records in which this value is empty.
    pub required: bool,

    /// Collect every match into a list.
    pub list: bool,

    /// Marks part of the record's identity. Informational only.
    pub key: bool,
}

impl ValueOptions {
    fn parse(spec: &str, line: usize) -> Result<Self> {
        let mut options = ValueOptions::default();
        for option in spec.split(',') {
            let flag = match option {
                "Filldown" => &mut options.filldown,
                "Fillup" => &mut options.fillup,
                "Required" => &mut options.required,
                "List" => &mut options.list,
                "Key" => &mut options.key,
                other => {
                    return Err(TemplateError::Syntax {
                        line,
                        message: format!("unknown value option '{other}'"),
                    });
                }
            };
            if *flag {
                return Err(TemplateError::Syntax {
                    line,
                    message: format!("duplicate value option '{option}'"),
                });
            }
            *flag = true;
        }
        Ok(options)
    }
}

/// A `Value` declaration.
#[derive(Debug, Clone)]
pub struct ValueDef {
    pub name: String,
    pub options: ValueOptions,

    /// Declared regex, including its outer parentheses.
    pub pattern: String,
}

impl ValueDef {
    /// Capture group name used for this value inside rule regexes.
    pub(crate) fn group_name(index: usize) -> String {
        format!("v{index}")
    }
}

/// What happens to the current input line after a rule matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LineOp {
    /// Take the next input line.
    #[default]
    Next,
    /// Keep trying the remaining rules on this line.
    Continue,
    /// Abort parsing.
    Error,
}

/// What happens to the current record after a rule matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecordOp {
    #[default]
    NoRecord,
    Record,
    Clear,
    Clearall,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub regex: Regex,
    pub line_op: LineOp,
    pub record_op: RecordOp,

    /// Target state, or the message of an `Error` action.
    pub new_state: Option<String>,

    /// Line of the rule in the template.
    pub line: usize,
}

/// A parsed TextFSM template.
#[derive(Debug, Clone)]
pub struct Template {
    pub values: Vec<ValueDef>,
    pub states: IndexMap<String, Vec<Rule>>,
}

impl Template {
    /// Parse template text.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l)).peekable();

        let mut values: Vec<ValueDef> = Vec::new();
        while let Some(&(num, line)) = lines.peek() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                if !values.is_empty() {
                    lines.next();
                    break;
                }
            } else if !trimmed.starts_with('#') {
                if !line.starts_with("Value ") {
                    if values.is_empty() {
                        return Err(TemplateError::Syntax {
                            line: num,
                            message: "expected a Value definition".into(),
                        });
                    }
                    break;
                }
                let value = parse_value(line, num)?;
                if values.iter().any(|v| v.name == value.name) {
                    return Err(TemplateError::Syntax {
                        line: num,
                        message: format!("duplicate value '{}'", value.name),
                    });
                }
                values.push(value);
            }
            lines.next();
        }
        if values.is_empty() {
            return Err(TemplateError::Syntax {
                line: 0,
                message: "template defines no values".into(),
            });
        }

        let mut states: IndexMap<String, Vec<Rule>> = IndexMap::new();
        let mut current: Option<String> = None;
        for (num, line) in lines {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                current = None;
                continue;
            }
            if trimmed.starts_with('#') {
                continue;
            }

            if !line.starts_with(char::is_whitespace) {
                if !is_state_name(trimmed) {
                    return Err(TemplateError::Syntax {
                        line: num,
                        message: format!("invalid state name '{trimmed}'"),
                    });
                }
                if trimmed == END_STATE || states.contains_key(trimmed) {
                    return Err(TemplateError::Syntax {
                        line: num,
                        message: format!("state '{trimmed}' redefined or reserved"),
                    });
                }
                states.insert(trimmed.to_string(), Vec::new());
                current = Some(trimmed.to_string());
                continue;
            }

            let state = current.as_ref().ok_or_else(|| TemplateError::Syntax {
                line: num,
                message: "rule outside of a state".into(),
            })?;
            let rule = parse_rule(trimmed, num, &values)?;
            if let Some(rules) = states.get_mut(state) {
                rules.push(rule);
            }
        }

        let template = Self { values, states };
        template.validate()?;
        Ok(template)
    }

    fn validate(&self) -> Result<()> {
        if !self.states.contains_key("Start") {
            return Err(TemplateError::Syntax {
                line: 0,
                message: "missing 'Start' state".into(),
            });
        }
        if self.states.get(EOF_STATE).is_some_and(|rules| !rules.is_empty()) {
            return Err(TemplateError::Syntax {
                line: 0,
                message: "the EOF state takes no rules".into(),
            });
        }
        for rules in self.states.values() {
            for rule in rules {
                if rule.line_op == LineOp::Error {
                    continue;
                }
                let Some(target) = &rule.new_state else {
                    continue;
                };
                if target != END_STATE && target != EOF_STATE && !self.states.contains_key(target) {
                    return Err(TemplateError::Syntax {
                        line: rule.line,
                        message: format!("unknown state '{target}'"),
                    });
                }
            }
        }
        Ok(())
    }

    /// Lower-cased value names, in declaration order.
    pub fn header(&self) -> Vec<String> {
        self.values.iter().map(|v| v.name.to_lowercase()).collect()
    }
}

fn is_state_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 48
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_value(line: &str, num: usize) -> Result<ValueDef> {
    let syntax = |message: &str| TemplateError::Syntax {
        line: num,
        message: message.to_string(),
    };

    let rest = line["Value ".len()..].trim_start();
    let (first, after_first) = rest
        .split_once(char::is_whitespace)
        .ok_or_else(|| syntax("incomplete Value definition"))?;
    let after_first = after_first.trim_start();

    let (options, name, pattern) = if after_first.starts_with('(') {
        (ValueOptions::default(), first, after_first)
    } else {
        let (name, pattern) = after_first
            .split_once(char::is_whitespace)
            .ok_or_else(|| syntax("incomplete Value definition"))?;
        (ValueOptions::parse(first, num)?, name, pattern.trim_start())
    };

    let pattern = pattern.trim_end();
    if !pattern.starts_with('(') || !pattern.ends_with(')') {
        return Err(syntax("value regex must be enclosed in parentheses"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(syntax("invalid value name"));
    }
    // The declared regex must compile on its own.
    Regex::new(pattern).map_err(|source| TemplateError::Regex { line: num, source })?;

    Ok(ValueDef {
        name: name.to_string(),
        options,
        pattern: pattern.to_string(),
    })
}

fn parse_rule(text: &str, num: usize, values: &[ValueDef]) -> Result<Rule> {
    if !text.starts_with('^') {
        return Err(TemplateError::Syntax {
            line: num,
            message: "rule must start with '^'".into(),
        });
    }

    let (pattern, action) = match text.rfind(" ->") {
        Some(pos) => (&text[..pos], text[pos + 3..].trim()),
        None => (text, ""),
    };
    let (line_op, record_op, new_state) = parse_action(action, num)?;

    let expanded = substitute(pattern, values, num)?;
    let regex = Regex::new(&format!("^(?:{expanded})"))
        .map_err(|source| TemplateError::Regex { line: num, source })?;

    Ok(Rule {
        regex,
        line_op,
        record_op,
        new_state,
        line: num,
    })
}

fn parse_action(action: &str, num: usize) -> Result<(LineOp, RecordOp, Option<String>)> {
    let syntax = |message: String| TemplateError::Syntax { line: num, message };
    if action.is_empty() {
        return Ok((LineOp::Next, RecordOp::NoRecord, None));
    }

    let (ops, target) = match action.split_once(char::is_whitespace) {
        Some((ops, target)) => (ops, Some(target.trim())),
        None => (action, None),
    };

    let (line_op, record_op) = match ops.split_once('.') {
        Some((line, record)) => (parse_line_op(line), parse_record_op(record)),
        None => match (parse_line_op(ops), parse_record_op(ops)) {
            (Some(line), _) => (Some(line), Some(RecordOp::NoRecord)),
            (None, Some(record)) => (Some(LineOp::Next), Some(record)),
            // A bare state name.
            (None, None) if target.is_none() && is_state_name(ops) => {
                return Ok((LineOp::Next, RecordOp::NoRecord, Some(ops.to_string())));
            }
            (None, None) => (None, None),
        },
    };
    let (Some(line_op), Some(record_op)) = (line_op, record_op) else {
        return Err(syntax(format!("invalid action '{action}'")));
    };

    let new_state = match target {
        Some(target) if line_op == LineOp::Error => Some(target.trim_matches('"').to_string()),
        Some(_) if line_op == LineOp::Continue => {
            return Err(syntax("Continue cannot change state".into()));
        }
        Some(target) if is_state_name(target) => Some(target.to_string()),
        Some(target) => return Err(syntax(format!("invalid state name '{target}'"))),
        None => None,
    };
    if line_op == LineOp::Error && record_op != RecordOp::NoRecord {
        return Err(syntax("Error cannot be combined with a record action".into()));
    }
    Ok((line_op, record_op, new_state))
}

fn parse_line_op(op: &str) -> Option<LineOp> {
    match op {
        "Next" => Some(LineOp::Next),
        "Continue" => Some(LineOp::Continue),
        "Error" => Some(LineOp::Error),
        _ => None,
    }
}

fn parse_record_op(op: &str) -> Option<RecordOp> {
    match op {
        "NoRecord" => Some(RecordOp::NoRecord),
        "Record" => Some(RecordOp::Record),
        "Clear" => Some(RecordOp::Clear),
        "Clearall" => Some(RecordOp::Clearall),
        _ => None,
    }
}

/// Expand `$Name`, `${Name}` and `$$` in a rule regex.
fn substitute(pattern: &str, values: &[ValueDef], num: usize) -> Result<String> {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut chars = pattern.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let rest = &pattern[i + 1..];
        let (name, consumed) = if rest.starts_with('$') {
            chars.next();
            out.push('$');
            continue;
        } else if let Some(inner) = rest.strip_prefix('{') {
            let end = inner.find('}').ok_or_else(|| TemplateError::Syntax {
                line: num,
                message: "unterminated '${'".into(),
            })?;
            (&inner[..end], end + 2)
        } else {
            let len = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            (&rest[..len], len)
        };

        if name.is_empty() {
            // A lone `$` is the end-of-line anchor.
            out.push('$');
            continue;
        }
        let index = values
            .iter()
            .position(|v| v.name == name)
            .ok_or_else(|| TemplateError::Syntax {
                line: num,
                message: format!("undeclared value '{name}'"),
            })?;
        let value = &values[index];
        out.push_str(&format!(
            "(?P<{}>{}",
            ValueDef::group_name(index),
            &value.pattern[1..]
        ));
        for _ in 0..consumed {
            chars.next();
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERSION: &str = r#"Value Required HOSTNAME (\S+)
Value Filldown,Key VERSION ([^ ,]+)
Value List FLASH (\S+)

Start
  ^.*Software.*Version\s+${VERSION}
  ^\s*${HOSTNAME}\s+uptime -> Continue
  ^flash:${FLASH}
  ^end -> Record End

# trailing comment
"#;

    #[test]
    fn test_parse_values_and_options() {
        let template = Template::parse(VERSION).unwrap();
        assert_eq!(template.header(), vec!["hostname", "version", "flash"]);
        assert!(template.values[0].options.required);
        assert!(template.values[1].options.filldown);
        assert!(template.values[1].options.key);
        assert!(template.values[2].options.list);
        assert_eq!(template.states["Start"].len(), 4);
    }

    #[test]
    fn test_rule_substitution_and_actions() {
        let template = Template::parse(VERSION).unwrap();
        let rules = &template.states["Start"];
        assert!(rules[0].regex.as_str().contains("(?P<v1>[^ ,]+)"));
        assert_eq!(rules[1].line_op, LineOp::Continue);
        assert_eq!(rules[3].record_op, RecordOp::Record);
        assert_eq!(rules[3].new_state.as_deref(), Some("End"));
    }

    #[test]
    fn test_double_dollar_is_literal_anchor() {
        let values = vec![ValueDef {
            name: "A".into(),
            options: ValueOptions::default(),
            pattern: r"(\d+)".into(),
        }];
        assert_eq!(substitute(r"^$A\s+$$", &values, 1).unwrap(), r"^(?P<v0>\d+)\s+$");
        assert_eq!(substitute(r"^x$", &values, 1).unwrap(), r"^x$");
    }

    #[test]
    fn test_rejects_bad_templates() {
        let no_start = "Value A (\\d+)\n\nOther\n  ^$A -> Record\n";
        assert!(Template::parse(no_start).is_err());

        let unknown_value = "Value A (\\d+)\n\nStart\n  ^$B -> Record\n";
        assert!(Template::parse(unknown_value).is_err());

        let unknown_state = "Value A (\\d+)\n\nStart\n  ^$A -> Record Nowhere\n";
        assert!(Template::parse(unknown_state).is_err());

        let continue_state = "Value A (\\d+)\n\nStart\n  ^$A -> Continue Start\n";
        assert!(Template::parse(continue_state).is_err());

        let bad_option = "Value Sometimes A (\\d+)\n\nStart\n  ^$A\n";
        assert!(Template::parse(bad_option).is_err());
    }

    #[test]
    fn test_error_action_keeps_message() {
        let text = "Value A (\\d+)\n\nStart\n  ^$A -> Record\n  ^. -> Error \"unexpected line\"\n";
        let template = Template::parse(text).unwrap();
        let rule = &template.states["Start"][1];
        assert_eq!(rule.line_op, LineOp::Error);
        assert_eq!(rule.new_state.as_deref(), Some("unexpected line"));
    }

    #[test]
    fn test_bare_state_transition() {
        let text = "Value A (\\d+)\n\nStart\n  ^Header -> Body\n\nBody\n  ^$A -> Record\n";
        let template = Template::parse(text).unwrap();
        let rule = &template.states["Start"][0];
        assert_eq!(rule.line_op, LineOp::Next);
        assert_eq!(rule.record_op, RecordOp::NoRecord);
        assert_eq!(rule.new_state.as_deref(), Some("Body"));
    }
}
