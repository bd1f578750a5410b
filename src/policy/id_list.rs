//! Parser and evaluator for id-list expressions.
//!
//! Supported syntax:
//! - Literal ids: `1, 2, abc-3`
//! - Every known id of the row's type: `[All]` (must stand alone)
//! - Members of a relationship of scoped entities: `[parent.children]`
//!
//! Whitespace between tokens is ignored.

use crate::graph::directory::EntityDirectory;
use crate::graph::entity::Entity;
use crate::policy::dictionary::TypeDictionary;
use crate::policy::errors::PolicyError;
use crate::policy::types::IdSet;

// ─── AST ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdListExpr {
    All,
    Terms(Vec<IdTerm>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdTerm {
    Id(String),
    Subcollection {
        entity_type: String,
        relationship: String,
    },
}

// ─── Parser ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    LBracket,
    RBracket,
    Dot,
    Comma,
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() => {
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            c if is_word_char(c) => {
                let start = i;
                while i < chars.len() && is_word_char(chars[i]) {
                    i += 1;
                }
                tokens.push(Token::Word(chars[start..i].iter().collect()));
            }
            c => return Err(format!("unexpected character `{c}`")),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

enum Term {
    All,
    Id(IdTerm),
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expect_word(&mut self, what: &str) -> Result<String, String> {
        match self.advance() {
            Some(Token::Word(w)) => Ok(w),
            other => Err(format!("expected {what}, found {other:?}")),
        }
    }

    /// list = term ("," term)*
    fn parse_list(&mut self) -> Result<IdListExpr, String> {
        let mut terms = Vec::new();
        let mut saw_all = false;
        loop {
            match self.parse_term()? {
                Term::All => saw_all = true,
                Term::Id(t) => terms.push(t),
            }
            if saw_all && (!terms.is_empty() || self.pos < self.tokens.len()) {
                return Err("`[All]` cannot be combined with other terms".into());
            }
            match self.advance() {
                None => break,
                Some(Token::Comma) => continue,
                Some(other) => return Err(format!("expected `,` between terms, found {other:?}")),
            }
        }
        if saw_all {
            return Ok(IdListExpr::All);
        }
        Ok(IdListExpr::Terms(terms))
    }

    /// term = ID | "[" "All" "]" | "[" TYPE "." RELATIONSHIP "]"
    fn parse_term(&mut self) -> Result<Term, String> {
        match self.advance() {
            Some(Token::Word(id)) => Ok(Term::Id(IdTerm::Id(id))),
            Some(Token::LBracket) => {
                let first = self.expect_word("a type name or `All`")?;
                match self.advance() {
                    Some(Token::RBracket) if first.eq_ignore_ascii_case("all") => Ok(Term::All),
                    Some(Token::Dot) => {
                        let relationship = self.expect_word("a relationship name")?;
                        match self.advance() {
                            Some(Token::RBracket) => Ok(Term::Id(IdTerm::Subcollection {
                                entity_type: first,
                                relationship,
                            })),
                            other => Err(format!(
                                "expected `]` after `[{first}.{relationship}`, found {other:?}"
                            )),
                        }
                    }
                    other => Err(format!("expected `.` or `]` after `[{first}`, found {other:?}")),
                }
            }
            other => Err(format!("unexpected token: {other:?}")),
        }
    }
}

/// Parse an id-list expression.
pub fn parse_id_list(input: &str) -> Result<IdListExpr, PolicyError> {
    let fail = |message: String| PolicyError::InvalidIdList {
        expression: input.to_string(),
        message,
    };
    let tokens = tokenize(input).map_err(fail)?;
    if tokens.is_empty() {
        return Err(fail("empty expression".into()));
    }
    let mut parser = Parser::new(tokens);
    parser.parse_list().map_err(fail)
}

// ─── Evaluator ──────────────────────────────────────────────────────────

/// Source of the entities a user can reach, used for `[type.relationship]` terms.
pub trait ScopedEntities<'g> {
    fn entities_of_type(&mut self, entity_type: &str) -> Result<Vec<&'g Entity>, PolicyError>;
}

/// Expand `expr` into ids of `target_type`.
pub fn evaluate<'g>(
    expr: &IdListExpr,
    target_type: &str,
    scoped: &mut dyn ScopedEntities<'g>,
    global: &EntityDirectory<'g>,
    dictionary: &TypeDictionary,
) -> Result<IdSet, PolicyError> {
    let mut ids = IdSet::new();
    match expr {
        IdListExpr::All => ids.extend(global.ids_of_type(target_type)),
        IdListExpr::Terms(terms) => {
            for term in terms {
                match term {
                    IdTerm::Id(id) => {
                        ids.insert(id);
                    }
                    IdTerm::Subcollection {
                        entity_type,
                        relationship,
                    } => {
                        let target = dictionary.relationship_target(entity_type, relationship)?;
                        if let Some(actual) = target {
                            if actual != target_type {
                                return Err(PolicyError::RelationshipTypeMismatch {
                                    entity_type: entity_type.clone(),
                                    relationship: relationship.clone(),
                                    expected: target_type.to_string(),
                                    actual: actual.to_string(),
                                });
                            }
                        }
                        for entity in scoped.entities_of_type(entity_type)? {
                            if let Some(collection) = entity.collection(relationship) {
                                ids.extend(collection.member_ids());
                            }
                        }
                    }
                }
            }
        }
    }
    Ok(ids)
}
