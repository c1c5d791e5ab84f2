//! Scoped, ordered number substitution rules.
//!
//! Rules come from repeated `--substitute` directives. A directive is either
//! a list of `FROM,TO` pairs that apply to every message, or a message ID
//! followed by pairs that apply only to the MMS with that `m_id`. Every pair
//! gets a sequence number from one counter shared by all directives, so the
//! order the operator wrote the rules in is the order they are tried in,
//! whichever scope they belong to.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;

/// Which messages a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Universal,
    Message(String),
}

/// One `FROM,TO` rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub from: String,
    pub to: String,
}

/// Append-only table of numbered rules keyed by scope.
#[derive(Debug, Clone, Default)]
pub struct SubstitutionTable {
    next_seq: usize,
    rules: HashMap<Scope, Vec<(usize, Substitution)>>,
}

impl SubstitutionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from directives in command-line order.
    ///
    /// Every directive is validated before it is added; the first malformed
    /// one aborts the whole build.
    pub fn from_directives<D, S>(directives: &[D]) -> Result<Self>
    where
        D: AsRef<[S]>,
        S: AsRef<str>,
    {
        let mut table = Self::new();
        for (i, directive) in directives.iter().enumerate() {
            table
                .add_directive(directive.as_ref())
                .with_context(|| format!("substitution directive #{}", i + 1))?;
        }
        Ok(table)
    }

    /// Add one directive: `[MESSAGE_ID] FROM,TO [FROM,TO ...]`.
    ///
    /// A leading value without a comma is taken as the message ID scope.
    pub fn add_directive<S: AsRef<str>>(&mut self, values: &[S]) -> Result<()> {
        let mut parsed: Vec<Vec<String>> = values.iter().map(|v| split_pair(v.as_ref())).collect();

        let scope = match parsed.first() {
            Some(first) if first.len() == 1 => {
                let key = first[0].clone();
                parsed.remove(0);
                Scope::Message(key)
            }
            _ => Scope::Universal,
        };

        if parsed.is_empty() {
            bail!("at least one comma-separated pair is required");
        }

        let malformed: Vec<String> = parsed
            .iter()
            .filter(|parts| parts.len() != 2)
            .map(|parts| parts.join(","))
            .collect();
        if !malformed.is_empty() {
            bail!(
                "arguments require exactly two comma-separated values: {:?}",
                malformed
            );
        }

        let entries = self.rules.entry(scope).or_default();
        for parts in parsed {
            let mut parts = parts.into_iter();
            if let (Some(from), Some(to)) = (parts.next(), parts.next()) {
                entries.push((self.next_seq, Substitution { from, to }));
                self.next_seq += 1;
            }
        }
        Ok(())
    }

    /// Total number of rules across all scopes.
    pub fn len(&self) -> usize {
        self.next_seq
    }

    pub fn is_empty(&self) -> bool {
        self.next_seq == 0
    }

    /// Rules that apply to a message, in sequence order.
    ///
    /// `message_id` of `None` (or an empty ID) selects the universal rules
    /// only.
    pub fn rules_for(&self, message_id: Option<&str>) -> MergedRules<'_> {
        let universal = self
            .rules
            .get(&Scope::Universal)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let scoped = message_id
            .filter(|id| !id.is_empty())
            .and_then(|id| self.rules.get(&Scope::Message(id.to_string())))
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        MergedRules { universal, scoped }
    }

    /// First rule whose source equals `address`.
    pub fn lookup(&self, message_id: Option<&str>, address: &str) -> Option<&Substitution> {
        self.rules_for(message_id)
            .map(|(_, rule)| rule)
            .find(|rule| rule.from == address)
    }

    /// Rewrite `address`, or return it unchanged when no rule matches.
    ///
    /// Only the first matching rule is applied; its replacement is not looked
    /// up again, so `A,B` followed by `B,C` turns `A` into `B`.
    pub fn rewrite<'a>(&'a self, message_id: Option<&str>, address: &'a str) -> &'a str {
        match self.lookup(message_id, address) {
            Some(rule) => rule.to.as_str(),
            None => address,
        }
    }
}

/// Stable merge of the universal and message-scoped rule lists by sequence
/// number.
pub struct MergedRules<'a> {
    universal: &'a [(usize, Substitution)],
    scoped: &'a [(usize, Substitution)],
}

impl<'a> Iterator for MergedRules<'a> {
    type Item = (usize, &'a Substitution);

    fn next(&mut self) -> Option<Self::Item> {
        let take_universal = match (self.universal.first(), self.scoped.first()) {
            (Some(u), Some(s)) => u.0 <= s.0,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => return None,
        };
        let side = if take_universal {
            &mut self.universal
        } else {
            &mut self.scoped
        };
        let current: &'a [(usize, Substitution)] = *side;
        let ((seq, rule), rest) = current.split_first()?;
        *side = rest;
        Some((*seq, rule))
    }
}

fn split_pair(value: &str) -> Vec<String> {
    value.split(',').map(|part| part.trim().to_string()).collect()
}
