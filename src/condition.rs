//! Structured write conditions
//!
//! Conditions are built as values instead of expression strings. The SDK client renders them into
//! a `ConditionExpression` with generated placeholders; the in-memory emulator evaluates them
//! directly against the stored item.

use crate::item::Item;
use crate::number::CanonicalNumber;
use aws_sdk_dynamodb::types::AttributeValue;
use std::cmp::Ordering;
use std::collections::HashMap;

const UNUSED_ATTRIBUTE: &str = "__condition_placeholder";

/// Condition on the item currently stored under the written key
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// The attribute is present
    AttributeExists(String),
    /// The attribute is absent (or the item does not exist)
    AttributeNotExists(String),
    /// The attribute equals the value
    Equals(String, AttributeValue),
    /// The attribute is present and differs from the value
    NotEquals(String, AttributeValue),
    /// The attribute is less than the value
    LessThan(String, AttributeValue),
    /// The attribute is greater than the value
    GreaterThan(String, AttributeValue),
    /// Every condition holds
    And(Vec<Condition>),
    /// At least one condition holds
    Or(Vec<Condition>),
    /// The condition does not hold
    Not(Box<Condition>),
}

impl Condition {
    /// `attribute_exists(name)`
    pub fn exists(name: impl Into<String>) -> Self {
        Condition::AttributeExists(name.into())
    }

    /// `attribute_not_exists(name)`
    pub fn not_exists(name: impl Into<String>) -> Self {
        Condition::AttributeNotExists(name.into())
    }

    /// `name = value`
    pub fn equals(name: impl Into<String>, value: AttributeValue) -> Self {
        Condition::Equals(name.into(), value)
    }

    /// `name <> value`
    pub fn not_equals(name: impl Into<String>, value: AttributeValue) -> Self {
        Condition::NotEquals(name.into(), value)
    }

    /// `name < value`
    pub fn less_than(name: impl Into<String>, value: AttributeValue) -> Self {
        Condition::LessThan(name.into(), value)
    }

    /// `name > value`
    pub fn greater_than(name: impl Into<String>, value: AttributeValue) -> Self {
        Condition::GreaterThan(name.into(), value)
    }

    /// Combines two conditions with a logical AND, flattening nested conjunctions
    pub fn and(self, other: Condition) -> Self {
        let mut parts = match self {
            Condition::And(parts) => parts,
            condition => vec![condition],
        };
        match other {
            Condition::And(more) => parts.extend(more),
            condition => parts.push(condition),
        }
        Condition::And(parts)
    }

    /// Combines two conditions with a logical OR
    pub fn or(self, other: Condition) -> Self {
        Condition::Or(vec![self, other])
    }

    /// Negates the condition
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Condition::Not(Box::new(self))
    }

    /// Combines optional conditions with a logical AND
    pub fn all(conditions: impl IntoIterator<Item = Option<Condition>>) -> Option<Condition> {
        conditions
            .into_iter()
            .flatten()
            .reduce(|combined, condition| combined.and(condition))
    }

    /// Evaluates the condition against the stored item, `None` meaning no item is stored.
    ///
    /// Comparisons against a missing attribute are false.
    pub fn evaluate(&self, item: Option<&Item>) -> bool {
        let attribute = |name: &str| item.and_then(|item| item.get(name));

        match self {
            Condition::AttributeExists(name) => attribute(name).is_some(),
            Condition::AttributeNotExists(name) => attribute(name).is_none(),
            Condition::Equals(name, value) => {
                compare(attribute(name), value) == Some(Ordering::Equal)
            }
            Condition::NotEquals(name, value) => attribute(name)
                .map(|stored| compare(Some(stored), value) != Some(Ordering::Equal))
                .unwrap_or(false),
            Condition::LessThan(name, value) => {
                compare(attribute(name), value) == Some(Ordering::Less)
            }
            Condition::GreaterThan(name, value) => {
                compare(attribute(name), value) == Some(Ordering::Greater)
            }
            Condition::And(parts) => parts.iter().all(|part| part.evaluate(item)),
            Condition::Or(parts) => parts.iter().any(|part| part.evaluate(item)),
            Condition::Not(inner) => !inner.evaluate(item),
        }
    }

    /// Renders the condition as a DynamoDB condition expression
    pub fn render(&self) -> RenderedCondition {
        let mut rendered = RenderedCondition::default();
        let expression = rendered.render(self);
        rendered.expression = expression;
        rendered
    }
}

/// A condition expression with its placeholder maps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedCondition {
    /// The `ConditionExpression`
    pub expression: String,

    /// `ExpressionAttributeNames`
    pub names: HashMap<String, String>,

    /// `ExpressionAttributeValues`
    pub values: HashMap<String, AttributeValue>,
}

impl RenderedCondition {
    fn name(&mut self, attribute: &str) -> String {
        if let Some((placeholder, _)) = self.names.iter().find(|(_, name)| *name == attribute) {
            return placeholder.clone();
        }
        let placeholder = format!("#n{}", self.names.len());
        self.names.insert(placeholder.clone(), attribute.to_string());
        placeholder
    }

    fn value(&mut self, value: &AttributeValue) -> String {
        let placeholder = format!(":v{}", self.values.len());
        self.values.insert(placeholder.clone(), value.clone());
        placeholder
    }

    fn comparison(&mut self, attribute: &str, operator: &str, value: &AttributeValue) -> String {
        let name = self.name(attribute);
        let value = self.value(value);
        format!("{} {} {}", name, operator, value)
    }

    fn join(&mut self, parts: &[Condition], operator: &str) -> String {
        let rendered: Vec<String> = parts
            .iter()
            .map(|part| format!("({})", self.render(part)))
            .collect();
        rendered.join(operator)
    }

    fn render(&mut self, condition: &Condition) -> String {
        match condition {
            Condition::AttributeExists(name) => format!("attribute_exists({})", self.name(name)),
            Condition::AttributeNotExists(name) => {
                format!("attribute_not_exists({})", self.name(name))
            }
            Condition::Equals(name, value) => self.comparison(name, "=", value),
            Condition::NotEquals(name, value) => self.comparison(name, "<>", value),
            Condition::LessThan(name, value) => self.comparison(name, "<", value),
            Condition::GreaterThan(name, value) => self.comparison(name, ">", value),
            // An empty conjunction is trivially true, an empty disjunction trivially false.
            Condition::And(parts) if parts.is_empty() => {
                let name = self.name(UNUSED_ATTRIBUTE);
                format!("attribute_exists({}) OR attribute_not_exists({})", name, name)
            }
            Condition::Or(parts) if parts.is_empty() => {
                let name = self.name(UNUSED_ATTRIBUTE);
                format!("attribute_exists({}) AND attribute_not_exists({})", name, name)
            }
            Condition::And(parts) => self.join(parts, " AND "),
            Condition::Or(parts) => self.join(parts, " OR "),
            Condition::Not(inner) => format!("NOT ({})", self.render(inner)),
        }
    }
}

/// Orders two attribute values of the same type. Numbers compare exactly by value, strings and
/// binaries lexicographically; other or mismatched types are only comparable for equality.
fn compare(stored: Option<&AttributeValue>, expected: &AttributeValue) -> Option<Ordering> {
    let stored = stored?;
    match (stored, expected) {
        (AttributeValue::N(a), AttributeValue::N(b)) => {
            let a = CanonicalNumber::parse(a)?;
            let b = CanonicalNumber::parse(b)?;
            Some(a.cmp(&b))
        }
        (AttributeValue::S(a), AttributeValue::S(b)) => Some(a.cmp(b)),
        (AttributeValue::B(a), AttributeValue::B(b)) => Some(a.as_ref().cmp(b.as_ref())),
        (a, b) if a == b => Some(Ordering::Equal),
        _ => None,
    }
}
