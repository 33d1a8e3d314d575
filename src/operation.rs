use std::fmt;

use crate::cast::{self, cast_str};
use crate::error::Error;
use crate::schema::ParamType;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Location {
    Header,
    Path,
    #[default]
    Query,
    Body,
}

impl Location {
    /// Maps an `in` value to a location. Cookies are not supported.
    pub fn from_param_in(value: &str) -> Option<Self> {
        match value {
            "header" => Some(Location::Header),
            "path" => Some(Location::Path),
            "query" => Some(Location::Query),
            "body" => Some(Location::Body),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Location::Header => "header",
            Location::Path => "path",
            Location::Query => "query",
            Location::Body => "body",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameter {
    pub location: Location,
    pub name: String,
    pub description: String,
    pub ty: ParamType,
    pub enum_values: Vec<String>,
    pub default: Option<String>,
    pub example: Option<String>,
    pub required: bool,
    pub deprecated: bool,
}

impl Parameter {
    /// Returns the name followed by its flags, e.g. `name (deprecated, required)`.
    pub fn name_with_flags(&self) -> String {
        let mut flags = Vec::new();
        if self.deprecated {
            flags.push("deprecated");
        }
        if self.required {
            flags.push("required");
        }
        if flags.is_empty() {
            self.name.clone()
        } else {
            format!("{} ({})", self.name, flags.join(", "))
        }
    }

    pub fn validate(&self, value: &str) -> Result<(), Error> {
        if self.required && value.is_empty() {
            return Err(Error::MissingParameter {
                location: self.location,
                name: self.name.clone(),
            });
        }
        if !value.is_empty()
            && !self.enum_values.is_empty()
            && !self.enum_values.iter().any(|allowed| allowed == value)
        {
            return Err(Error::InvalidEnumValue {
                location: self.location,
                name: self.name.clone(),
                allowed: self.enum_values.clone(),
            });
        }
        Ok(())
    }

    pub fn cast(&self, raw: &str) -> Result<cast::Value, Error> {
        cast_str(raw, &self.ty).map_err(|source| Error::Cast {
            name: self.name.clone(),
            source,
        })
    }
}

/// Parameters of one location, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterList(Vec<Parameter>);

impl ParameterList {
    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn by_name(&self, name: &str) -> Option<&Parameter> {
        self.0.iter().find(|p| p.name == name)
    }

    /// Adds a parameter, replacing one with the same name in place.
    pub fn add(&mut self, param: Parameter) {
        match self.0.iter_mut().find(|p| p.name == param.name) {
            Some(existing) => *existing = param,
            None => self.0.push(param),
        }
    }

    /// Validates every parameter against the value `lookup` returns for it.
    /// A missing value counts as empty.
    pub fn validate<'a, F>(&self, lookup: F) -> Result<(), Error>
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        self.0
            .iter()
            .try_for_each(|param| param.validate(lookup(param.name.as_str()).unwrap_or("")))
    }
}

impl<'a> IntoIterator for &'a ParameterList {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    pub header: ParameterList,
    pub path: ParameterList,
    pub query: ParameterList,
    pub body: ParameterList,
}

impl Parameters {
    pub fn add(&mut self, param: Parameter) {
        match param.location {
            Location::Header => self.header.add(param),
            Location::Path => self.path.add(param),
            Location::Query => self.query.add(param),
            Location::Body => self.body.add(param),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Operation {
    pub id: String,
    pub summary: String,
    pub description: String,
    pub tag: String,
    pub method: String,
    pub path: String,
    pub parameters: Parameters,
    pub body_format: String,
    pub deprecated: bool,
}

impl Operation {
    pub fn has_body(&self) -> bool {
        !self.body_format.is_empty()
    }

    pub fn summary_with_flags(&self) -> String {
        if self.deprecated {
            format!("{} (deprecated)", self.summary)
        } else {
            self.summary.clone()
        }
    }
}

/// The operations of one document, in catalog order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Operations(Vec<Operation>);

impl Operations {
    pub fn new(operations: Vec<Operation>) -> Self {
        Operations(operations)
    }

    pub fn by_id(&self, id: &str) -> Option<&Operation> {
        self.0.iter().find(|op| op.id == id)
    }

    pub fn by_tag(&self, tag: &str) -> Vec<&Operation> {
        self.0.iter().filter(|op| op.tag == tag).collect()
    }

    /// Returns the distinct tags, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.0.iter().map(|op| op.tag.as_str()).collect();
        tags.sort_unstable();
        tags.dedup();
        tags
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a Operations {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
