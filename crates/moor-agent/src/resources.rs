use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use log::warn;
use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::error::AgentError;

const BYTES_PER_MIB: u64 = 1024 * 1024;

/// A single resource value.
/// Scalars are fractional quantities (e.g. `cpus`), ranges are sets of
/// integer intervals (e.g. `ports`), and sets are collections of opaque
/// items (e.g. `disks`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Scalar(f64),
    Ranges(Vec<(u64, u64)>),
    Set(BTreeSet<String>),
}

/// A normalized multi-resource vector keyed by resource name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resources(BTreeMap<String, Value>);

impl Resources {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn scalar(&self, name: &str) -> Option<f64> {
        match self.0.get(name) {
            Some(Value::Scalar(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn cpus(&self) -> Option<f64> {
        self.scalar("cpus")
    }

    pub fn mem(&self) -> Option<f64> {
        self.scalar("mem")
    }

    /// Insert a resource value, combining it with any existing value
    /// of the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        match self.0.entry(name.into()) {
            Entry::Vacant(entry) => {
                entry.insert(value);
            }
            Entry::Occupied(mut entry) => combine(entry.get_mut(), value),
        }
    }

    /// Combine another resource vector into this one.
    pub fn merge(&mut self, other: &Resources) {
        for (name, value) in &other.0 {
            self.insert(name.clone(), value.clone());
        }
    }

    /// Detect the resources of the local machine.
    /// Memory leaves 1 GiB of headroom for the system when more than
    /// 1 GiB is available.
    pub fn detect() -> Resources {
        let system = System::new_all();
        let cpus = match system.cpus().len() {
            0 => {
                warn!("failed to detect the number of cpus, defaulting to 1");
                1
            }
            cpus => cpus,
        };
        let mem = match system.total_memory() / BYTES_PER_MIB {
            0 => {
                warn!("failed to detect the size of main memory, defaulting to 1024 MiB");
                1024
            }
            mem if mem > 1024 => mem - 1024,
            mem => mem,
        };
        let mut resources = Resources::default();
        resources.insert("cpus", Value::Scalar(cpus as f64));
        resources.insert("mem", Value::Scalar(mem as f64));
        resources
    }
}

fn combine(left: &mut Value, right: Value) {
    match (left, right) {
        (Value::Scalar(left), Value::Scalar(right)) => *left += right,
        (Value::Ranges(left), Value::Ranges(right)) => {
            left.extend(right);
            *left = coalesce(std::mem::take(left));
        }
        (Value::Set(left), Value::Set(right)) => left.extend(right),
        (left, right) => {
            warn!("cannot combine mismatched resource values {left:?} and {right:?}");
        }
    }
}

/// Sort and merge overlapping or adjacent integer ranges.
fn coalesce(mut ranges: Vec<(u64, u64)>) -> Vec<(u64, u64)> {
    ranges.sort_unstable();
    let mut out: Vec<(u64, u64)> = vec![];
    for (start, end) in ranges {
        match out.last_mut() {
            Some((_, last)) if start <= last.saturating_add(1) => {
                *last = std::cmp::max(*last, end);
            }
            _ => out.push((start, end)),
        }
    }
    out
}

impl FromStr for Resources {
    type Err = AgentError;

    /// Parse a resource vector such as
    /// `cpus:4;mem:2048;ports:[2000-3000,5000-6000];disks:{sda1,sda2}`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut resources = Resources::default();
        for item in s.split(';') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let (name, value) = item.split_once(':').ok_or_else(|| {
                AgentError::InvalidArgument(format!("invalid resource: {item}"))
            })?;
            resources.insert(name.trim(), value.trim().parse()?);
        }
        Ok(resources)
    }
}

impl FromStr for Value {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = || AgentError::InvalidArgument(format!("invalid resource value: {s}"));
        if let Some(inner) = s.strip_prefix('[').and_then(|x| x.strip_suffix(']')) {
            let mut ranges = vec![];
            for range in inner.split(',') {
                let range = range.trim();
                if range.is_empty() {
                    continue;
                }
                let (start, end) = range.split_once('-').ok_or_else(error)?;
                let start = start.trim().parse().map_err(|_| error())?;
                let end = end.trim().parse().map_err(|_| error())?;
                if start > end {
                    return Err(error());
                }
                ranges.push((start, end));
            }
            Ok(Value::Ranges(coalesce(ranges)))
        } else if let Some(inner) = s.strip_prefix('{').and_then(|x| x.strip_suffix('}')) {
            let items = inner
                .split(',')
                .map(|x| x.trim())
                .filter(|x| !x.is_empty())
                .map(|x| x.to_string())
                .collect();
            Ok(Value::Set(items))
        } else {
            let value = s.parse().map_err(|_| error())?;
            Ok(Value::Scalar(value))
        }
    }
}

impl fmt::Display for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.0 {
            if !first {
                write!(f, ";")?;
            }
            write!(f, "{name}:{value}")?;
            first = false;
        }
        Ok(())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(value) => write!(f, "{value}"),
            Value::Ranges(ranges) => {
                write!(f, "[")?;
                for (i, (start, end)) in ranges.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{start}-{end}")?;
                }
                write!(f, "]")
            }
            Value::Set(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// An opaque key-value attribute attached to the agent.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(Vec<Attribute>);

impl Attributes {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.0.iter()
    }
}

impl FromStr for Attributes {
    type Err = AgentError;

    /// Parse an attribute bag such as `rack:r1;floor:2`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut attributes = vec![];
        for item in s.split(';') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let (name, value) = item.split_once(':').ok_or_else(|| {
                AgentError::InvalidArgument(format!("invalid attribute: {item}"))
            })?;
            attributes.push(Attribute {
                name: name.trim().to_string(),
                value: value.trim().to_string(),
            });
        }
        Ok(Attributes(attributes))
    }
}

impl fmt::Display for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for attribute in &self.0 {
            if !first {
                write!(f, ";")?;
            }
            write!(f, "{}:{}", attribute.name, attribute.value)?;
            first = false;
        }
        Ok(())
    }
}
