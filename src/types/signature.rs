/// Ordered column name to type-and-constraint mapping used to generate DDL.
///
/// ```
/// use planetae_db::Signature;
///
/// let sig = Signature::new()
///     .column("name", "VARCHAR(255) NOT NULL")
///     .column("phone", "INT(11) NOT NULL");
/// assert_eq!(sig.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    columns: Vec<(String, String)>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column; redefining an existing column replaces its definition in place.
    pub fn column(mut self, name: impl Into<String>, definition: impl Into<String>) -> Self {
        let name = name.into();
        let definition = definition.into();
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some((_, def)) => *def = definition,
            None => self.columns.push((name, definition)),
        }
        self
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns.iter().map(|(n, d)| (n.as_str(), d.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }
}

impl<N: Into<String>, D: Into<String>> FromIterator<(N, D)> for Signature {
    fn from_iter<I: IntoIterator<Item = (N, D)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Signature::new(), |sig, (n, d)| sig.column(n, d))
    }
}
