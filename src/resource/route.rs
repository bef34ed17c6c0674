//! Mapping from `(method, path template)` to the scope an operation requires.

// crates.io
use reqwest::Method;
// self
use crate::{_prelude::*, auth::ScopeSet, error::ConfigError};

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
	Literal(String),
	Param,
}

#[derive(Clone, Debug)]
struct Route {
	method: Method,
	segments: Vec<Segment>,
	scope: String,
}
impl Route {
	fn matches(&self, method: &Method, path: &[&str]) -> bool {
		&self.method == method
			&& self.segments.len() == path.len()
			&& self.segments.iter().zip(path).all(|(segment, part)| match segment {
				Segment::Literal(literal) => literal == part,
				Segment::Param => !part.is_empty(),
			})
	}
}

/// Route table of a protected API.
///
/// Templates use `{name}` for single-segment parameters, e.g. `/orders/{item}`.
/// Requests to unregistered routes have no satisfiable scope.
#[derive(Clone, Debug, Default)]
pub struct RouteTable {
	routes: Vec<Route>,
}
impl RouteTable {
	/// Creates an empty table.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `method template` as requiring `scope`.
	pub fn route(
		mut self,
		method: Method,
		template: &str,
		scope: impl Into<String>,
	) -> Result<Self, ConfigError> {
		let scope = scope.into();
		let parsed = ScopeSet::from_str(&scope)?;

		if parsed.len() != 1 {
			return Err(ConfigError::InvalidSetting {
				name: "route scope",
				reason: format!("`{scope}` must name exactly one scope"),
			});
		}

		let segments = split(template)
			.map(|part| {
				if part.starts_with('{') && part.ends_with('}') && part.len() > 2 {
					Segment::Param
				} else {
					Segment::Literal(part.to_owned())
				}
			})
			.collect();

		self.routes.push(Route { method, segments, scope });

		Ok(self)
	}

	/// Scope required by `method path`, or `None` for unregistered routes.
	pub fn required_scope(&self, method: &Method, path: &str) -> Option<&str> {
		let path = path.split('?').next().unwrap_or_default();
		let parts: Vec<&str> = split(path).collect();

		self.routes
			.iter()
			.find(|route| route.matches(method, &parts))
			.map(|route| route.scope.as_str())
	}
}

fn split(path: &str) -> impl Iterator<Item = &str> {
	path.split('/').filter(|part| !part.is_empty())
}
