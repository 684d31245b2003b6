//! Parameter descriptors and values.
//!
//! Each parameterized transform describes the set of parameters it accepts
//! (its *gamut*) as a static slice of [`OpParameter`]s, and reports its actual
//! values as a [`ParameterValues`] collection. The same machinery is used by
//! the [definition](crate::definition) parser to build transforms from text.

use crate::Error;
use log::error;
use log::warn;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// The `OpParameter` enumeration is used to represent which defining parameters
/// are valid for a given transform.
///
/// Required parameters have their default value set to `None`, optional
/// parameters provide a default of the proper type. Flags are booleans which
/// are true if present and false if not, so they carry no default.
///
/// For a given transform, the union of the sets of its required and optional
/// parameters is called the *gamut* of the transform.
#[derive(Debug)]
pub enum OpParameter {
    /// A flag is a boolean that is true if present, false if not
    Flag { key: &'static str },
    /// The natural numbers + zero (𝐍₀ or 𝐖 in math terms)
    Natural {
        key: &'static str,
        default: Option<usize>,
    },
    /// Reals (𝐑 in math terms)
    Real {
        key: &'static str,
        default: Option<f64>,
    },
    /// A series of reals (𝐑ⁿ in math terms)
    Series {
        key: &'static str,
        default: Option<&'static str>,
    },
    /// Any kind of text
    Text {
        key: &'static str,
        default: Option<&'static str>,
    },
}

impl OpParameter {
    pub fn key(&self) -> &'static str {
        match *self {
            OpParameter::Flag { key } => key,
            OpParameter::Natural { key, .. } => key,
            OpParameter::Real { key, .. } => key,
            OpParameter::Series { key, .. } => key,
            OpParameter::Text { key, .. } => key,
        }
    }
}

/// The parameter values of a transform, binned by type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterValues {
    pub name: String,

    pub boolean: BTreeSet<&'static str>,
    pub natural: BTreeMap<&'static str, usize>,
    pub real: BTreeMap<&'static str, f64>,
    pub series: BTreeMap<&'static str, Vec<f64>>,
    pub text: BTreeMap<&'static str, String>,

    /// Keys given in a definition, but not part of the gamut
    pub ignored: Vec<String>,
}

// Accessors
impl ParameterValues {
    pub fn boolean(&self, key: &str) -> bool {
        self.boolean.contains(key)
    }
    pub fn natural(&self, key: &str) -> Result<usize, Error> {
        if let Some(value) = self.natural.get(key) {
            return Ok(*value);
        }
        Err(Error::MissingParam(key.to_string()))
    }
    pub fn real(&self, key: &str) -> Result<f64, Error> {
        if let Some(value) = self.real.get(key) {
            return Ok(*value);
        }
        Err(Error::MissingParam(key.to_string()))
    }
    pub fn series(&self, key: &str) -> Result<&[f64], Error> {
        if let Some(value) = self.series.get(key) {
            return Ok(value);
        }
        Err(Error::MissingParam(key.to_string()))
    }
    pub fn text(&self, key: &str) -> Result<String, Error> {
        if let Some(value) = self.text.get(key) {
            return Ok(value.to_string());
        }
        Err(Error::MissingParam(key.to_string()))
    }
    pub fn ignored(&self) -> Vec<String> {
        self.ignored.clone()
    }
}

// Builders, used by the transforms when reporting their own values
impl ParameterValues {
    pub fn named(name: &str) -> ParameterValues {
        ParameterValues {
            name: name.to_string(),
            ..Default::default()
        }
    }
    pub fn with_flag(mut self, key: &'static str, value: bool) -> Self {
        if value {
            self.boolean.insert(key);
        }
        self
    }
    pub fn with_natural(mut self, key: &'static str, value: usize) -> Self {
        self.natural.insert(key, value);
        self
    }
    pub fn with_real(mut self, key: &'static str, value: f64) -> Self {
        self.real.insert(key, value);
        self
    }
    pub fn with_series(mut self, key: &'static str, value: &[f64]) -> Self {
        self.series.insert(key, value.to_vec());
        self
    }
    pub fn with_text(mut self, key: &'static str, value: &str) -> Self {
        self.text.insert(key, value.to_string());
        self
    }

    /// Equality of all values, with reals compared to within a relative
    /// tolerance of `eps`
    pub fn approx_eq(&self, other: &ParameterValues, eps: f64) -> bool {
        fn close(a: f64, b: f64, eps: f64) -> bool {
            a == b || (a - b).abs() <= eps * a.abs().max(b.abs()) || (a.is_nan() && b.is_nan())
        }
        if self.name != other.name
            || self.boolean != other.boolean
            || self.natural != other.natural
            || self.text != other.text
        {
            return false;
        }
        if self.real.len() != other.real.len() || self.series.len() != other.series.len() {
            return false;
        }
        for (key, a) in &self.real {
            match other.real.get(key) {
                Some(b) if close(*a, *b, eps) => {}
                _ => return false,
            }
        }
        for (key, a) in &self.series {
            match other.series.get(key) {
                Some(b) if a.len() == b.len() => {
                    if !a.iter().zip(b).all(|(a, b)| close(*a, *b, eps)) {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        true
    }
}

impl ParameterValues {
    /// Parse a textual step definition, `name key=value flag ...`, against a gamut
    pub fn new(definition: &str, gamut: &[OpParameter]) -> Result<ParameterValues, Error> {
        let mut locals = split_into_parameters(definition);
        let mut boolean = BTreeSet::<&'static str>::new();
        let mut natural = BTreeMap::<&'static str, usize>::new();
        let mut real = BTreeMap::<&'static str, f64>::new();
        let mut series = BTreeMap::<&'static str, Vec<f64>>::new();
        let mut text = BTreeMap::<&'static str, String>::new();

        let name = locals.remove("name").unwrap_or_else(|| "unknown".to_string());

        // Try to locate all accepted parameters, type check, and place them into
        // their proper bins
        for p in gamut {
            match *p {
                OpParameter::Flag { key } => {
                    if let Some(value) = locals.remove(key) {
                        if value.is_empty() || value.to_lowercase() == "true" {
                            boolean.insert(key);
                            continue;
                        }
                        warn!("Cannot parse {key}:{value} as a boolean constant!");
                        return Err(Error::BadParam(key.to_string(), value));
                    }
                    // Flags are always optional
                    continue;
                }

                OpParameter::Natural { key, default } => {
                    if let Some(value) = locals.remove(key) {
                        if let Ok(v) = value.parse::<usize>() {
                            natural.insert(key, v);
                            continue;
                        }
                        warn!("Cannot parse {key}:{value} as a natural number!");
                        return Err(Error::BadParam(key.to_string(), value));
                    }
                    if let Some(value) = default {
                        natural.insert(key, value);
                        continue;
                    }
                    error!("Missing required parameter '{key}'");
                    return Err(Error::MissingParam(key.to_string()));
                }

                OpParameter::Real { key, default } => {
                    if let Some(value) = locals.remove(key) {
                        if let Ok(v) = value.parse::<f64>() {
                            real.insert(key, v);
                            continue;
                        }
                        warn!("Cannot parse {key}:{value} as a real number");
                        return Err(Error::BadParam(key.to_string(), value));
                    }
                    if let Some(value) = default {
                        real.insert(key, value);
                        continue;
                    }
                    error!("Missing required parameter '{key}'");
                    return Err(Error::MissingParam(key.to_string()));
                }

                OpParameter::Series { key, default } => {
                    let value = match (locals.remove(key), default) {
                        (Some(value), _) => value,
                        // Defaults to nothing, so we just continue with the next parameter
                        (None, Some("")) => continue,
                        (None, Some(value)) => value.to_string(),
                        (None, None) => {
                            error!("Missing required parameter '{key}'");
                            return Err(Error::MissingParam(key.to_string()));
                        }
                    };
                    let mut elements = Vec::<f64>::new();
                    for element in value.split(',') {
                        if let Ok(v) = element.trim().parse::<f64>() {
                            elements.push(v);
                            continue;
                        }
                        warn!("Cannot parse {key}:{value} as a series");
                        return Err(Error::BadParam(key.to_string(), value));
                    }
                    series.insert(key, elements);
                }

                OpParameter::Text { key, default } => {
                    if let Some(value) = locals.remove(key) {
                        text.insert(key, value);
                        continue;
                    }
                    if let Some(value) = default {
                        text.insert(key, value.to_string());
                        continue;
                    }
                    error!("Missing required parameter '{key}'");
                    return Err(Error::MissingParam(key.to_string()));
                }
            }
        }

        // Whatever remains was given, but not used
        let ignored: Vec<String> = locals.into_keys().collect();
        for key in &ignored {
            warn!("{name}: ignoring unknown parameter '{key}'");
        }

        Ok(ParameterValues {
            name,
            boolean,
            natural,
            real,
            series,
            text,
            ignored,
        })
    }
}

/// Split a step definition into a map of key/value pairs. The first element,
/// if not a key=value pair, is taken as the name of the step.
pub fn split_into_parameters(step: &str) -> BTreeMap<String, String> {
    // Conflate contiguous whitespace, then remove whitespace around {"=", ","}
    let step = step.trim().to_string();
    let elements: Vec<_> = step.split_whitespace().collect();
    let step = elements
        .join(" ")
        .replace("= ", "=")
        .replace(", ", ",")
        .replace(" =", "=")
        .replace(" ,", ",");

    let mut params = BTreeMap::new();
    for element in step.split_whitespace() {
        // Flags are booleans that are true when specified, false when not
        let (key, value) = match element.split_once('=') {
            Some((key, value)) => (key, value),
            None => (element, "true"),
        };

        // If the first arg is a key-without-value, it is the name of the step
        if params.is_empty() && !element.contains('=') {
            params.insert(String::from("name"), String::from(key));
            continue;
        }

        params.insert(String::from(key), String::from(value));
    }

    params
}

// ----- T E S T S ------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    const GAMUT: [OpParameter; 6] = [
        OpParameter::Flag    { key: "flag" },
        OpParameter::Natural { key: "natural",  default: Some(0) },
        OpParameter::Real    { key: "real",     default: Some(1.25) },
        OpParameter::Series  { key: "series",   default: Some("1,2,3,4") },
        OpParameter::Text    { key: "text",     default: Some("text") },
        OpParameter::Real    { key: "required", default: None },
    ];

    #[test]
    fn split() {
        let p = split_into_parameters("linear   scale = 2 offset=3 inv");
        assert_eq!(p["name"], "linear");
        assert_eq!(p["scale"], "2");
        assert_eq!(p["offset"], "3");
        assert_eq!(p["inv"], "true");
    }

    #[test]
    fn basic() -> Result<(), Error> {
        let p = ParameterValues::new("cucumber flag required=3 series=5, 6 bogus=1", &GAMUT)?;
        assert_eq!(p.name, "cucumber");
        assert!(p.boolean("flag"));
        assert_eq!(p.natural("natural")?, 0);
        assert_eq!(p.real("real")?, 1.25);
        assert_eq!(p.real("required")?, 3.);
        assert_eq!(p.series("series")?, [5., 6.]);
        assert_eq!(p.text("text")?, "text");
        assert_eq!(p.ignored(), ["bogus"]);
        assert!(matches!(p.real("nothing"), Err(Error::MissingParam(_))));

        assert!(matches!(
            ParameterValues::new("cucumber", &GAMUT),
            Err(Error::MissingParam(_))
        ));
        assert!(matches!(
            ParameterValues::new("cucumber required=banana", &GAMUT),
            Err(Error::BadParam(_, _))
        ));
        Ok(())
    }

    #[test]
    fn approximate_equality() {
        let a = ParameterValues::named("exp").with_real("base", 10.).with_real("scale", 1.);
        let b = ParameterValues::named("exp")
            .with_real("base", 10.0 + 1e-12)
            .with_real("scale", 1.);
        assert_ne!(a, b);
        assert!(a.approx_eq(&b, 1e-10));
        assert!(!a.approx_eq(&b.clone().with_flag("inv", true), 1e-10));
    }
}
