//! Well-known-text like rendering of transforms.
//!
//! Concatenations are rendered over their pseudo-steps, so a kernel surrounded
//! by its own normalization affines shows as the single operation the user
//! asked for. Failing to fold an affine is not an error: the raw steps are
//! rendered instead, and a warning logged.

use crate::authoring::*;
use crate::linear::linear;
use crate::transform::Contextual;
use crate::IDENTITY_TOLERANCE;
use std::fmt::Write;

/// Fold the normalization affines of the kernel at `steps[index]` out of its
/// neighbors. Neighbors reducing to the identity are removed, missing
/// neighbors are inserted. Returns the new index of the kernel.
pub fn fold_contextual(contextual: &Contextual, steps: &mut Vec<TransformRef>, index: usize) -> usize {
    let index = match fold_before(&contextual.normalize, steps, index) {
        Ok(index) => index,
        Err(e) => {
            warn!("{}: cannot fold normalization: {e}", steps[index].name());
            index
        }
    };
    if let Err(e) = fold_after(&contextual.denormalize, steps, index) {
        warn!("{}: cannot fold denormalization: {e}", steps[index].name());
    }
    index
}

fn fold_before(normalize: &Matrix, steps: &mut Vec<TransformRef>, index: usize) -> Result<usize, Error> {
    let inverse = normalize.inverse()?;
    let neighbor = match index {
        0 => None,
        _ => steps[index - 1].matrix(),
    };
    let mut remainder = match &neighbor {
        Some(m) => inverse.multiply(m)?,
        None => inverse,
    };
    if remainder.is_identity_within(IDENTITY_TOLERANCE) {
        if neighbor.is_some() {
            steps.remove(index - 1);
            return Ok(index - 1);
        }
        return Ok(index);
    }
    remainder.round_near_integers(IDENTITY_TOLERANCE);
    let step = linear(&remainder)?;
    if neighbor.is_some() {
        steps[index - 1] = step;
        return Ok(index);
    }
    steps.insert(index, step);
    Ok(index + 1)
}

fn fold_after(denormalize: &Matrix, steps: &mut Vec<TransformRef>, index: usize) -> Result<(), Error> {
    let inverse = denormalize.inverse()?;
    let neighbor = steps.get(index + 1).and_then(|step| step.matrix());
    let mut remainder = match &neighbor {
        Some(m) => m.multiply(&inverse)?,
        None => inverse,
    };
    // Target coordinates may be large (e.g. metres on the Earth)
    let tolerance = IDENTITY_TOLERANCE * denormalize.max_abs().max(1.);
    if remainder.is_identity_within(tolerance) {
        if neighbor.is_some() {
            steps.remove(index + 1);
        }
        return Ok(());
    }
    remainder.round_near_integers(IDENTITY_TOLERANCE);
    let step = linear(&remainder)?;
    if neighbor.is_some() {
        steps[index + 1] = step;
    } else {
        steps.insert(index + 1, step);
    }
    Ok(())
}

/// The steps of `tr` as they are to be presented
pub fn pseudo_steps(tr: &TransformRef) -> Vec<TransformRef> {
    if let Some(c) = tr.downcast_ref::<ConcatenatedTransform>() {
        return c.pseudo_steps();
    }
    let mut steps = vec![tr.clone()];
    tr.before_format(&mut steps, 0);
    steps
}

// ----- F O R M A T T E R -----------------------------------------------------------

/// Accumulates the textual rendering of one or more transforms
#[derive(Debug)]
pub struct Formatter {
    buffer: String,
    indentation: usize,
    depth: usize,
}

impl Default for Formatter {
    fn default() -> Self {
        Formatter::new()
    }
}

impl Formatter {
    pub fn new() -> Formatter {
        Formatter::with_indentation(2)
    }

    pub fn with_indentation(indentation: usize) -> Formatter {
        Formatter {
            buffer: String::new(),
            indentation,
            depth: 0,
        }
    }

    pub fn append(&mut self, tr: &TransformRef) {
        let steps = pseudo_steps(tr);
        if steps.len() == 1 {
            self.step(&steps[0]);
            return;
        }
        self.buffer.push_str("CONCAT_MT[");
        for (i, step) in steps.iter().enumerate() {
            if i > 0 {
                self.buffer.push(',');
            }
            self.child(|f| f.step(step));
        }
        self.buffer.push(']');
    }

    pub fn into_string(self) -> String {
        self.buffer
    }

    fn newline(&mut self) {
        self.buffer.push('\n');
        let width = self.depth * self.indentation;
        self.buffer.extend(std::iter::repeat(' ').take(width));
    }

    fn child<F: FnOnce(&mut Formatter)>(&mut self, render: F) {
        self.depth += 1;
        self.newline();
        render(self);
        self.depth -= 1;
    }

    fn step(&mut self, tr: &TransformRef) {
        if tr.is::<ConcatenatedTransform>() {
            self.append(tr);
            return;
        }
        if let Some(pt) = tr.downcast_ref::<PassThroughTransform>() {
            let _ = write!(
                self.buffer,
                "PASSTHROUGH_MT[{}, {},",
                pt.first_affected_ordinate(),
                pt.num_trailing_ordinates()
            );
            let sub = pt.sub_transform().clone();
            self.child(|f| f.append(&sub));
            self.buffer.push(']');
            return;
        }
        let values = match tr.parameters() {
            Some(values) => values,
            None => {
                let _ = write!(self.buffer, "PARAM_MT[\"{}\"]", tr.name());
                return;
            }
        };
        let _ = write!(self.buffer, "PARAM_MT[\"{}\"", values.name);
        for (key, value) in parameter_list(tr.as_ref(), &values) {
            self.buffer.push(',');
            self.child(|f| {
                let _ = write!(f.buffer, "PARAMETER[\"{key}\", {value}]");
            });
        }
        self.buffer.push(']');
    }
}

/// The `(key, value)` pairs to render, in gamut order when there is one.
/// Affines list only the elements differing from the identity.
fn parameter_list(tr: &dyn MathTransform, values: &ParameterValues) -> Vec<(String, String)> {
    let mut list = Vec::new();
    if values.name == "Affine" {
        let rows = values.natural("num_row").unwrap_or(0);
        let cols = values.natural("num_col").unwrap_or(0);
        list.push((String::from("num_row"), rows.to_string()));
        list.push((String::from("num_col"), cols.to_string()));
        let elements = values.series("elements").unwrap_or(&[]);
        for (i, value) in elements.iter().enumerate() {
            let (r, c) = (i / cols.max(1), i % cols.max(1));
            let default = if r == c { 1. } else { 0. };
            if *value != default {
                list.push((format!("elt_{r}_{c}"), value.to_string()));
            }
        }
        return list;
    }

    let mut keys: Vec<&str> = match tr.parameter_descriptors() {
        Some(gamut) => gamut.iter().map(|p| p.key()).collect(),
        None => Vec::new(),
    };
    for key in values
        .boolean
        .iter()
        .chain(values.natural.keys())
        .chain(values.real.keys())
        .chain(values.series.keys())
        .chain(values.text.keys())
    {
        if !keys.contains(key) {
            keys.push(key);
        }
    }

    for key in keys {
        let value = if values.boolean(key) {
            String::from("TRUE")
        } else if let Some(v) = values.natural.get(key) {
            v.to_string()
        } else if let Some(v) = values.real.get(key) {
            v.to_string()
        } else if let Some(v) = values.series.get(key) {
            v.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(", ")
        } else if let Some(v) = values.text.get(key) {
            format!("\"{v}\"")
        } else {
            continue;
        };
        list.push((key.to_string(), value));
    }
    list
}

/// Render `tr` as well-known-text like string
pub fn to_wkt(tr: &TransformRef) -> String {
    let mut formatter = Formatter::new();
    formatter.append(tr);
    formatter.into_string()
}

// ----- T E S T S ------------------------------------------------------------------
