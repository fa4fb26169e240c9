use std::fmt;

/// What a namespace holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
  /// Shell assets populated at install
  Static,
  /// Responses cached on the fly while serving requests
  Runtime,
}

impl Purpose {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Static => "static",
      Self::Runtime => "runtime",
    }
  }
}

/// A `{purpose, version}` pair naming one physical cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
  purpose: Purpose,
  version: String,
}

impl Namespace {
  pub fn new(purpose: Purpose, version: impl Into<String>) -> Self {
    Self {
      purpose,
      version: version.into(),
    }
  }

  /// Physical cache name, e.g. `static-v1.0.0`.
  pub fn name(&self) -> String {
    self.to_string()
  }
}

impl fmt::Display for Namespace {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}", self.purpose.as_str(), self.version)
  }
}

/// The static and runtime namespaces of the active version.
///
/// Every other cache name is stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespaces {
  pub static_assets: Namespace,
  pub runtime: Namespace,
}

impl Namespaces {
  pub fn for_version(version: &str) -> Self {
    Self {
      static_assets: Namespace::new(Purpose::Static, version),
      runtime: Namespace::new(Purpose::Runtime, version),
    }
  }

  /// Exact match against one of the two current names.
  pub fn is_current(&self, name: &str) -> bool {
    name == self.static_assets.name() || name == self.runtime.name()
  }
}
