//! TextFSM state machine.

use indexmap::IndexMap;
use log::trace;
use serde::{Deserialize, Serialize};

use super::template::{END_STATE, EOF_STATE, LineOp, RecordOp, Rule, Template, ValueDef};
use crate::error::TemplateError;

/// One extracted field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            FieldValue::List(_) => None,
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(text) => text.is_empty(),
            FieldValue::List(items) => items.is_empty(),
        }
    }
}

/// One record: lower-cased value name to field, in declaration order.
pub type ParsedRow = IndexMap<String, FieldValue>;

/// Working state of one value while parsing.
#[derive(Debug, Clone, Default)]
struct Slot {
    value: Option<String>,
    list: Vec<String>,
    /// Last assigned value, restored on clear for Filldown.
    kept: Option<String>,
}

struct Run<'t> {
    template: &'t Template,
    slots: Vec<Slot>,
    rows: Vec<Vec<FieldValue>>,
}

impl Template {
    /// Run the template over `text`, producing one row per record.
    pub fn parse_text(&self, text: &str) -> Result<Vec<ParsedRow>, TemplateError> {
        let mut run = Run {
            template: self,
            slots: vec![Slot::default(); self.values.len()],
            rows: Vec::new(),
        };

        let mut state = "Start".to_string();
        for (index, line) in text.lines().enumerate() {
            if let Some(next) = run.check_line(&state, line, index + 1)? {
                state = next;
            }
            if state == END_STATE || state == EOF_STATE {
                break;
            }
        }

        if state != END_STATE && !self.states.contains_key(EOF_STATE) {
            run.append_record();
        }

        let header = self.header();
        Ok(run
            .rows
            .into_iter()
            .map(|row| header.iter().cloned().zip(row).collect())
            .collect())
    }
}

impl Run<'_> {
    /// Apply the rules of `state` to one line; returns the new state, if any.
    fn check_line(&mut self, state: &str, line: &str, number: usize) -> Result<Option<String>, TemplateError> {
        let template = self.template;
        let Some(rules) = template.states.get(state) else {
            return Ok(None);
        };

        for rule in rules {
            let Some(captures) = rule.regex.captures(line) else {
                continue;
            };
            for index in 0..template.values.len() {
                let group = ValueDef::group_name(index);
                if rule.regex.capture_names().flatten().any(|n| n == group) {
                    let value = captures.name(&group).map(|m| m.as_str().to_string());
                    self.assign(index, value);
                }
            }

            if self.apply(rule, line, number)? {
                trace!("rule at template line {} consumed {:?}", rule.line, line);
                return Ok(rule.new_state.clone());
            }
        }
        Ok(None)
    }

    /// Perform the rule's actions; `true` when the line is consumed.
    fn apply(&mut self, rule: &Rule, line: &str, number: usize) -> Result<bool, TemplateError> {
        match rule.record_op {
            RecordOp::Record => self.append_record(),
            RecordOp::Clear => self.clear_record(),
            RecordOp::Clearall => self.clear_all(),
            RecordOp::NoRecord => {}
        }

        match rule.line_op {
            LineOp::Error => Err(TemplateError::Raised {
                line: number,
                message: match &rule.new_state {
                    Some(message) => format!("{message}: {line:?}"),
                    None => format!("state error at {line:?}"),
                },
            }),
            LineOp::Continue => Ok(false),
            LineOp::Next => Ok(true),
        }
    }

    fn assign(&mut self, index: usize, value: Option<String>) {
        let options = self.template.values[index].options;
        let slot = &mut self.slots[index];

        if options.list {
            if let Some(v) = &value {
                slot.list.push(v.clone());
            }
        }
        slot.value = value;
        if options.filldown {
            slot.kept = slot.value.clone();
        }

        if options.fillup {
            if let Some(v) = slot.value.clone().filter(|v| !v.is_empty()) {
                for row in self.rows.iter_mut().rev() {
                    if !row[index].is_empty() {
                        break;
                    }
                    row[index] = FieldValue::Text(v.clone());
                }
            }
        }
    }

    fn append_record(&mut self) {
        let values = &self.template.values;
        let mut row = Vec::with_capacity(values.len());
        let mut empty = true;

        for (def, slot) in values.iter().zip(&self.slots) {
            let field = if def.options.list {
                FieldValue::List(slot.list.clone())
            } else {
                FieldValue::Text(slot.value.clone().unwrap_or_default())
            };
            if def.options.required && field.is_empty() {
                self.clear_record();
                return;
            }
            if !field.is_empty() || (!def.options.list && slot.value.is_some()) {
                empty = false;
            }
            row.push(field);
        }

        if !empty {
            self.rows.push(row);
        }
        self.clear_record();
    }

    fn clear_record(&mut self) {
        for (def, slot) in self.template.values.iter().zip(self.slots.iter_mut()) {
            if def.options.filldown {
                // Filldown lists keep their items too.
                slot.value = slot.kept.clone();
                continue;
            }
            slot.value = None;
            slot.list.clear();
        }
    }

    fn clear_all(&mut self) {
        for slot in &mut self.slots {
            *slot = Slot::default();
        }
    }
}
