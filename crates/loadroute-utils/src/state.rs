//! The runtime state file read by visualization and test tooling.
//!
//! The file is line oriented. Between `@start.path` and `@end.path` every host pair's route is one
//! `{path: weight, ...}` mapping, and between `@start.load` and `@end.load` every link is one
//! `(a, b, utilization)` tuple. Names are quoted and floats are printed the way Python's `repr`
//! prints them, since the consumers `eval` each line.

use std::fmt::Write as _;
use std::path::Path;

use loadroute_core::{NodeId, Route, RouteTable, UsageStore};

use crate::Error;

/// Renders the route table and per-link utilization, both sorted by key.
pub fn render_state(routes: &RouteTable, loads: &UsageStore<f64>) -> String {
    let mut out = String::new();
    out.push_str("@start.path\n");
    let mut pairs = routes
        .iter()
        .filter(|(_, route)| !route.is_empty())
        .collect::<Vec<_>>();
    pairs.sort_by_key(|&(pair, _)| pair);
    for (_, route) in pairs {
        out.push_str(&route_repr(route));
        out.push('\n');
    }
    out.push_str("@end.path\n");
    out.push_str("@start.load\n");
    let mut links = loads.iter().collect::<Vec<_>>();
    links.sort_by_key(|&(pair, _)| pair);
    for (pair, &load) in links {
        let (a, b) = pair.into_tuple();
        // Writing to a `String` cannot fail
        let _ = writeln!(out, "('{a}', '{b}', {})", py_float(load));
    }
    out.push_str("@end.load\n");
    out
}

/// Writes the rendered state to `path`, replacing the previous file in one rename so a polling
/// reader never sees a partial file.
pub fn write_state(
    path: impl AsRef<Path>,
    routes: &RouteTable,
    loads: &UsageStore<f64>,
) -> Result<(), Error> {
    let path = path.as_ref();
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, render_state(routes, loads))?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn route_repr(route: &Route) -> String {
    let entries = match route {
        Route::SinglePath(path) => vec![(path_repr(path), 1.0)],
        Route::WeightedPaths(weighted) => {
            let mut entries = weighted.iter().collect::<Vec<_>>();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            entries
                .into_iter()
                .map(|(path, weight)| (path_repr(path), weight))
                .collect()
        }
    };
    let body = entries
        .into_iter()
        .map(|(path, weight)| format!("{path}: {}", py_float(weight)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{body}}}")
}

fn path_repr(path: &[NodeId]) -> String {
    let names = path.iter().map(|n| format!("'{n}'")).collect::<Vec<_>>();
    match names.as_slice() {
        [one] => format!("({one},)"),
        _ => format!("({})", names.join(", ")),
    }
}

/// Formats `x` like Python's `repr(float)`: the shortest digits that round-trip, positional
/// between `1e-4` and `1e16` and scientific with a signed two-digit exponent outside.
pub fn py_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".into();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.into();
    }
    if x == 0.0 {
        return if x.is_sign_negative() { "-0.0" } else { "0.0" }.into();
    }
    let sci = format!("{x:e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((&sci, "0"));
    let exp = exp.parse::<i32>().unwrap_or(0);
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(m) => ("-", m),
        None => ("", mantissa),
    };
    let digits = mantissa.replace('.', "");
    if !(-4..16).contains(&exp) {
        let mantissa = match digits.len() {
            1 => digits,
            _ => format!("{}.{}", &digits[..1], &digits[1..]),
        };
        let exp_sign = if exp < 0 { '-' } else { '+' };
        return format!("{sign}{mantissa}e{exp_sign}{:02}", exp.abs());
    }
    if exp < 0 {
        let zeros = "0".repeat((-exp - 1) as usize);
        return format!("{sign}0.{zeros}{digits}");
    }
    let point = exp as usize + 1;
    if digits.len() <= point {
        let zeros = "0".repeat(point - digits.len());
        format!("{sign}{digits}{zeros}.0")
    } else {
        format!("{sign}{}.{}", &digits[..point], &digits[point..])
    }
}
