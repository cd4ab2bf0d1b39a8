//! Value-generation strategies derived from type descriptors
//!
//! Every descriptor variant maps to one proptest strategy producing
//! `serde_json::Value`s inside the declared domain. Boundary values (declared
//! min/max, empty, null when nullable) are mixed in with a fixed weight so they
//! show up in small trial budgets.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use proptest::prelude::*;
use proptest::sample::select;
use proptest::strategy::{BoxedStrategy, Just, Union};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::descriptor::{
    ArrayConstraints, EnumConstraints, IntegerConstraints, NumberConstraints, ObjectConstraints,
    StringConstraints, StringFormat, TypeDescriptor,
};
use crate::model::{Operation, ParamKey, ParameterSpec};

/// Weight of an in-domain random sample.
const SAMPLE_WEIGHT: u32 = 4;
/// Weight of a declared boundary value.
const BOUNDARY_WEIGHT: u32 = 1;
/// Weight of `null` for nullable descriptors.
const NULL_WEIGHT: u32 = 1;
/// Probability an optional field or parameter is present.
const OPTIONAL_PRESENCE: f64 = 0.5;

/// Range used when a number declares no bounds.
const DEFAULT_NUMBER_SPAN: f64 = 1e12;
/// Free-text length above `minLength` when no `maxLength` is declared.
const DEFAULT_STRING_SPAN: usize = 32;
const MAX_STRING_LEN: usize = 10_000;
/// Array length above `minItems` when no `maxItems` is declared.
const DEFAULT_ARRAY_SPAN: usize = 5;
const MAX_ARRAY_LEN: usize = 1_000;

pub type ValueStrategy = BoxedStrategy<Value>;
/// One drawn value per present parameter.
pub type ParamValues = BTreeMap<ParamKey, Value>;
pub type ParamsStrategy = BoxedStrategy<ParamValues>;

/// `{path:id=5, query:q="x"}`, values as compact JSON.
pub struct ParamsDisplay<'a>(pub &'a ParamValues);

impl std::fmt::Display for ParamsDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        f.write_str("}")
    }
}

/// A recognized descriptor whose constraints cannot be satisfied.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("empty range: {0}")]
    EmptyRange(String),

    #[error("enum declares no values")]
    EmptyEnum,

    #[error("invalid pattern {pattern:?}: {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("parameter '{name}': {source}")]
    Parameter {
        name: String,
        source: Box<StrategyError>,
    },

    #[error("field '{name}': {source}")]
    Field {
        name: String,
        source: Box<StrategyError>,
    },
}

/// Composed strategy for one operation, or the reason it cannot be tested.
pub enum OperationStrategy {
    Ready(ParamsStrategy),
    /// Names the first parameter without a usable descriptor
    Unsupported { parameter: String },
}

impl std::fmt::Debug for OperationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(_) => f.write_str("Ready(..)"),
            Self::Unsupported { parameter } => f
                .debug_struct("Unsupported")
                .field("parameter", parameter)
                .finish(),
        }
    }
}

/// Maps descriptors to strategies. Holds no state; strategies are built fresh
/// per operation and never mutated across draws.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyFactory;

impl StrategyFactory {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    pub fn value_strategy(&self, descriptor: &TypeDescriptor) -> Result<ValueStrategy, StrategyError> {
        let strategy = match descriptor {
            TypeDescriptor::Integer(c) => integer(c)?,
            TypeDescriptor::Number(c) => number(c)?,
            TypeDescriptor::String(c) => string(c)?,
            TypeDescriptor::Boolean { .. } => any::<bool>().prop_map(Value::Bool).boxed(),
            TypeDescriptor::Array(c) => self.array(c)?,
            TypeDescriptor::Object(c) => self.object(c)?,
            TypeDescriptor::Enum(c) => enumeration(c)?,
        };
        Ok(with_null(strategy, descriptor.nullable()))
    }

    /// `Ok(None)` when the parameter's type is unsupported.
    pub fn parameter_strategy(
        &self,
        spec: &ParameterSpec,
    ) -> Result<Option<ValueStrategy>, StrategyError> {
        let Some(descriptor) = &spec.descriptor else {
            return Ok(None);
        };
        self.value_strategy(descriptor)
            .map(Some)
            .map_err(|e| StrategyError::Parameter {
                name: spec.name.clone(),
                source: Box::new(e),
            })
    }

    /// Compose all parameters of `op` into one key → value strategy.
    ///
    /// Required parameters are always present, optional ones are omitted
    /// with nonzero probability. A single unsupported parameter makes the
    /// whole operation [`OperationStrategy::Unsupported`].
    pub fn operation_strategy(&self, op: &Operation) -> Result<OperationStrategy, StrategyError> {
        if let Some(spec) = op.unsupported_parameter() {
            return Ok(OperationStrategy::Unsupported {
                parameter: spec.name.clone(),
            });
        }

        let mut entries = Vec::with_capacity(op.parameters.len());
        for spec in op.parameters.values() {
            let Some(strategy) = self.parameter_strategy(spec)? else {
                return Ok(OperationStrategy::Unsupported {
                    parameter: spec.name.clone(),
                });
            };
            entries.push(entry(spec.key(), strategy, spec.required));
        }

        let params = collect_entries(entries)
            .prop_map(|pairs| pairs.into_iter().collect::<ParamValues>())
            .boxed();
        Ok(OperationStrategy::Ready(params))
    }

    fn array(&self, c: &ArrayConstraints) -> Result<ValueStrategy, StrategyError> {
        let min = c.min_items.unwrap_or(0);
        if min > MAX_ARRAY_LEN {
            return Err(StrategyError::EmptyRange(format!(
                "minItems {min} above the {MAX_ARRAY_LEN} item limit"
            )));
        }
        let max = c
            .max_items
            .unwrap_or(min.saturating_add(DEFAULT_ARRAY_SPAN))
            .min(MAX_ARRAY_LEN);
        if min > max {
            return Err(StrategyError::EmptyRange(format!(
                "minItems {min} > maxItems {max}"
            )));
        }
        let items = self.value_strategy(&c.items)?;
        let elements = proptest::collection::vec(items, min..=max);
        let sample = if c.unique_items {
            elements
                .prop_map(distinct)
                .prop_filter("uniqueItems", move |values| values.len() >= min)
                .prop_map(Value::Array)
                .boxed()
        } else {
            elements.prop_map(Value::Array).boxed()
        };
        let edges = if min == 0 {
            vec![Value::Array(Vec::new())]
        } else {
            Vec::new()
        };
        Ok(with_edges(sample, edges))
    }

    fn object(&self, c: &ObjectConstraints) -> Result<ValueStrategy, StrategyError> {
        let mut entries = Vec::with_capacity(c.fields.len());
        for (name, field) in &c.fields {
            let strategy =
                self.value_strategy(&field.descriptor)
                    .map_err(|e| StrategyError::Field {
                        name: name.clone(),
                        source: Box::new(e),
                    })?;
            entries.push(entry(name.clone(), strategy, field.required));
        }
        Ok(collect_entries(entries)
            .prop_map(|pairs| Value::Object(pairs.into_iter().collect::<Map<String, Value>>()))
            .boxed())
    }
}

type EntryStrategy<K> = BoxedStrategy<Option<(K, Value)>>;

fn entry<K>(key: K, strategy: ValueStrategy, required: bool) -> EntryStrategy<K>
where
    K: Clone + std::fmt::Debug + 'static,
{
    if required {
        strategy.prop_map(move |v| Some((key.clone(), v))).boxed()
    } else {
        proptest::option::weighted(OPTIONAL_PRESENCE, strategy)
            .prop_map(move |v| v.map(|v| (key.clone(), v)))
            .boxed()
    }
}

/// Fold per-entry strategies into one that yields every present entry, in order.
fn collect_entries<K>(entries: Vec<EntryStrategy<K>>) -> BoxedStrategy<Vec<(K, Value)>>
where
    K: Clone + std::fmt::Debug + 'static,
{
    entries
        .into_iter()
        .fold(Just(Vec::new()).boxed(), |acc, next| {
            (acc, next)
                .prop_map(|(mut pairs, item)| {
                    pairs.extend(item);
                    pairs
                })
                .boxed()
        })
}

/// Keep the first occurrence of each value, order preserved.
fn distinct(values: Vec<Value>) -> Vec<Value> {
    let mut kept = Vec::with_capacity(values.len());
    for value in values {
        if !kept.contains(&value) {
            kept.push(value);
        }
    }
    kept
}

fn with_edges(sample: ValueStrategy, edges: Vec<Value>) -> ValueStrategy {
    if edges.is_empty() {
        return sample;
    }
    Union::new_weighted(vec![
        (SAMPLE_WEIGHT, sample),
        (BOUNDARY_WEIGHT, select(edges).boxed()),
    ])
    .boxed()
}

fn with_null(strategy: ValueStrategy, nullable: bool) -> ValueStrategy {
    if !nullable {
        return strategy;
    }
    Union::new_weighted(vec![
        (SAMPLE_WEIGHT + BOUNDARY_WEIGHT, strategy),
        (NULL_WEIGHT, Just(Value::Null).boxed()),
    ])
    .boxed()
}

fn integer(c: &IntegerConstraints) -> Result<ValueStrategy, StrategyError> {
    // i128 so exclusive adjustments at the i64 edges cannot overflow
    let mut low = i128::from(c.minimum.unwrap_or(i64::MIN));
    let mut high = i128::from(c.maximum.unwrap_or(i64::MAX));
    if c.exclusive_minimum && c.minimum.is_some() {
        low += 1;
    }
    if c.exclusive_maximum && c.maximum.is_some() {
        high -= 1;
    }
    if low > high {
        return Err(StrategyError::EmptyRange(format!(
            "no integer in [{low}, {high}]"
        )));
    }

    let (sample, mut edges) = match c.multiple_of {
        Some(step) => {
            let k = i128::from(step);
            let first = -(-low).div_euclid(k);
            let last = high.div_euclid(k);
            if first > last {
                return Err(StrategyError::EmptyRange(format!(
                    "no multiple of {step} in [{low}, {high}]"
                )));
            }
            let first = to_i64(first)?;
            let last = to_i64(last)?;
            let sample = (first..=last)
                .prop_map(move |m| Value::from(m * step))
                .boxed();
            let mut edges = vec![Value::from(first * step), Value::from(last * step)];
            if first < 0 && last > 0 {
                edges.push(Value::from(0));
            }
            (sample, edges)
        }
        None => {
            let low = to_i64(low)?;
            let high = to_i64(high)?;
            let sample = (low..=high).prop_map(Value::from).boxed();
            let mut edges = vec![Value::from(low), Value::from(high)];
            if low < 0 && high > 0 {
                edges.push(Value::from(0));
            }
            (sample, edges)
        }
    };
    edges.dedup();
    Ok(with_edges(sample, edges))
}

fn to_i64(value: i128) -> Result<i64, StrategyError> {
    i64::try_from(value).map_err(|_| StrategyError::EmptyRange(format!("{value} outside i64")))
}

fn number(c: &NumberConstraints) -> Result<ValueStrategy, StrategyError> {
    let low = c.minimum.unwrap_or(-DEFAULT_NUMBER_SPAN);
    let high = c.maximum.unwrap_or(DEFAULT_NUMBER_SPAN);
    let exclusive_low = c.exclusive_minimum && c.minimum.is_some();
    let exclusive_high = c.exclusive_maximum && c.maximum.is_some();
    if !low.is_finite() || !high.is_finite() {
        return Err(StrategyError::EmptyRange(format!(
            "non-finite bound in [{low}, {high}]"
        )));
    }
    if low > high || (low == high && (exclusive_low || exclusive_high)) {
        return Err(StrategyError::EmptyRange(format!(
            "no number in [{low}, {high}]"
        )));
    }

    let sample = (low..=high)
        .prop_filter("exclusive bound", move |v| {
            (!exclusive_low || *v > low) && (!exclusive_high || *v < high)
        })
        .prop_map(Value::from)
        .boxed();

    let mut edges = Vec::new();
    if !exclusive_low {
        edges.push(Value::from(low));
    }
    if !exclusive_high && high != low {
        edges.push(Value::from(high));
    }
    if low < 0.0 && high > 0.0 {
        edges.push(Value::from(0.0));
    }
    Ok(with_edges(sample, edges))
}

fn string(c: &StringConstraints) -> Result<ValueStrategy, StrategyError> {
    let min = c.min_length.unwrap_or(0);
    if min > MAX_STRING_LEN {
        return Err(StrategyError::EmptyRange(format!(
            "minLength {min} above the {MAX_STRING_LEN} character limit"
        )));
    }
    let max = c
        .max_length
        .unwrap_or(min.saturating_add(DEFAULT_STRING_SPAN))
        .min(MAX_STRING_LEN);
    if min > max {
        return Err(StrategyError::EmptyRange(format!(
            "minLength {min} > maxLength {max}"
        )));
    }
    let bounded = c.min_length.is_some() || c.max_length.is_some();

    if let Some(format) = c.format {
        let mut strategy = format_strategy(format);
        // a pattern next to a format narrows the format's output
        if let Some(pattern) = &c.pattern {
            let regex = regex::Regex::new(pattern).map_err(|e| StrategyError::Pattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            strategy = strategy
                .prop_filter("pattern", move |s| regex.is_match(s))
                .boxed();
        }
        return Ok(length_filtered(strategy, bounded, min, max));
    }

    if let Some(pattern) = &c.pattern {
        let regex = unanchored(pattern);
        let strategy = proptest::string::string_regex(regex)
            .map_err(|e| StrategyError::Pattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?
            .boxed();
        return Ok(length_filtered(strategy, bounded, min, max));
    }

    let sample = proptest::collection::vec(proptest::char::range(' ', '~'), min..=max)
        .prop_map(|chars| Value::String(chars.into_iter().collect()))
        .boxed();
    let mut edges = vec![Value::String("a".repeat(min))];
    if max != min {
        edges.push(Value::String("z".repeat(max)));
    }
    Ok(with_edges(sample, edges))
}

fn length_filtered(
    strategy: BoxedStrategy<String>,
    bounded: bool,
    min: usize,
    max: usize,
) -> ValueStrategy {
    if !bounded {
        return strategy.prop_map(Value::String).boxed();
    }
    strategy
        .prop_filter("length bounds", move |s| {
            (min..=max).contains(&s.chars().count())
        })
        .prop_map(Value::String)
        .boxed()
}

/// Strip `^`/`$` anchors, the generator always produces a whole match.
fn unanchored(pattern: &str) -> &str {
    let trimmed = pattern.strip_prefix('^').unwrap_or(pattern);
    match trimmed.strip_suffix('$') {
        Some(rest) if !rest.ends_with('\\') => rest,
        _ => trimmed,
    }
}

fn format_strategy(format: StringFormat) -> BoxedStrategy<String> {
    match format {
        StringFormat::Date => date().boxed(),
        StringFormat::Time => time().boxed(),
        StringFormat::DateTime => (date(), time())
            .prop_map(|(d, t)| format!("{d}T{t}"))
            .boxed(),
        StringFormat::Email => "[a-z][a-z0-9]{0,11}@[a-z]{1,10}\\.(com|org|net)".boxed(),
        StringFormat::Uuid => {
            "[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}".boxed()
        }
        StringFormat::Uri => "https?://[a-z]{1,10}\\.(com|org|net)(/[a-z0-9]{1,8}){0,3}".boxed(),
        StringFormat::Hostname => {
            "[a-z]([a-z0-9-]{0,10}[a-z0-9])?(\\.[a-z]([a-z0-9-]{0,10}[a-z0-9])?){0,2}".boxed()
        }
        StringFormat::Ipv4 => any::<[u8; 4]>()
            .prop_map(|octets| Ipv4Addr::from(octets).to_string())
            .boxed(),
        StringFormat::Ipv6 => any::<[u16; 8]>()
            .prop_map(|segments| Ipv6Addr::from(segments).to_string())
            .boxed(),
        StringFormat::Byte => proptest::collection::vec(any::<u8>(), 0..=24)
            .prop_map(|bytes| STANDARD.encode(bytes))
            .boxed(),
    }
}

fn date() -> impl Strategy<Value = String> {
    // day capped at 28 keeps every month valid
    (1970u32..=2099, 1u32..=12, 1u32..=28).prop_map(|(y, m, d)| format!("{y:04}-{m:02}-{d:02}"))
}

fn time() -> impl Strategy<Value = String> {
    (0u32..24, 0u32..60, 0u32..60).prop_map(|(h, m, s)| format!("{h:02}:{m:02}:{s:02}Z"))
}

fn enumeration(c: &EnumConstraints) -> Result<ValueStrategy, StrategyError> {
    if c.values.is_empty() {
        // `enum: [null]` on a nullable descriptor: null is the only value
        if c.nullable {
            return Ok(Just(Value::Null).boxed());
        }
        return Err(StrategyError::EmptyEnum);
    }
    Ok(select(c.values.clone()).boxed())
}
