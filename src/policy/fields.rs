//! Field-restriction expressions: `[ALL]`, `a, b`, `[EXCLUDING] a, b`, or empty.
//! Keywords are case-insensitive.

use std::collections::BTreeSet;

use crate::policy::dictionary::TypeDictionary;
use crate::policy::errors::PolicyError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldsExpr {
    Empty,
    All,
    Listed(Vec<String>),
    Excluding(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Keyword(String),
    Term(String),
    Comma,
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
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '[' => {
                let start = i + 1;
                while i < chars.len() && chars[i] != ']' {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err("unterminated keyword".into());
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(Token::Keyword(word.trim().to_ascii_uppercase()));
                i += 1;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Term(chars[start..i].iter().collect()));
            }
            c => return Err(format!("unexpected character `{c}`")),
        }
    }
    Ok(tokens)
}

fn parse_terms(tokens: &[Token]) -> Result<Vec<String>, String> {
    let mut terms = Vec::new();
    let mut expect_term = true;
    for token in tokens {
        match (token, expect_term) {
            (Token::Term(t), true) => {
                terms.push(t.clone());
                expect_term = false;
            }
            (Token::Comma, false) => expect_term = true,
            (other, _) => return Err(format!("unexpected token: {other:?}")),
        }
    }
    if expect_term {
        return Err("expected a field name".into());
    }
    Ok(terms)
}

/// Parse a field-restriction expression.
pub fn parse_fields(input: &str) -> Result<FieldsExpr, PolicyError> {
    let fail = |message: String| PolicyError::InvalidFieldExpression {
        expression: input.to_string(),
        message,
    };
    let tokens = tokenize(input).map_err(fail)?;
    match tokens.split_first() {
        None => Ok(FieldsExpr::Empty),
        Some((Token::Keyword(k), rest)) if k == "ALL" => {
            if rest.is_empty() {
                Ok(FieldsExpr::All)
            } else {
                Err(fail("`[ALL]` must stand alone".into()))
            }
        }
        Some((Token::Keyword(k), rest)) if k == "EXCLUDING" => {
            Ok(FieldsExpr::Excluding(parse_terms(rest).map_err(fail)?))
        }
        Some((Token::Keyword(k), _)) => Err(fail(format!("unknown keyword `[{k}]`"))),
        Some(_) => Ok(FieldsExpr::Listed(parse_terms(&tokens).map_err(fail)?)),
    }
}

/// Resolve `expr` against the declared fields of `entity_type`.
pub fn evaluate(
    expr: &FieldsExpr,
    entity_type: &str,
    dictionary: &TypeDictionary,
) -> Result<BTreeSet<String>, PolicyError> {
    let check = |fields: &[String]| -> Result<(), PolicyError> {
        let def = dictionary.get(entity_type)?;
        match fields.iter().find(|f| !def.has_field(f)) {
            Some(unknown) => Err(PolicyError::UnknownField {
                entity_type: entity_type.to_string(),
                field: unknown.clone(),
            }),
            None => Ok(()),
        }
    };

    match expr {
        FieldsExpr::Empty => Ok(BTreeSet::new()),
        FieldsExpr::All => dictionary.field_names(entity_type),
        FieldsExpr::Listed(fields) => {
            check(fields)?;
            Ok(fields.iter().cloned().collect())
        }
        FieldsExpr::Excluding(fields) => {
            check(fields)?;
            let mut all = dictionary.field_names(entity_type)?;
            for f in fields {
                all.remove(f);
            }
            Ok(all)
        }
    }
}

/// Parse and resolve in one step.
pub fn restricted_fields(
    input: &str,
    entity_type: &str,
    dictionary: &TypeDictionary,
) -> Result<BTreeSet<String>, PolicyError> {
    evaluate(&parse_fields(input)?, entity_type, dictionary)
}
