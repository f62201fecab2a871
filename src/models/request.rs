/// Extra query parameters for a search. Keys compare case-insensitively and
/// keep their first-seen position; a later insert replaces the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParameters {
    entries: Vec<(String, String)>,
}

impl QueryParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&key))
        {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    /// Overlay `other` on top of `self`.
    pub fn merge(&mut self, other: &QueryParameters) {
        for (key, value) in other.iter() {
            self.insert(key, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for QueryParameters
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = QueryParameters::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

/// A normalized crawl request for one suburb
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlRequest {
    /// Free-text location query, e.g. "Bondi Beach"
    pub suburb_query: String,
    /// State code such as "NSW"
    pub state: Option<String>,
    /// Stop after this many listings have been emitted
    pub max_listings: Option<usize>,
    pub query_parameters: QueryParameters,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_case_insensitively_and_keeps_position() {
        let mut params = QueryParameters::new();
        params.insert("where", "Bondi");
        params.insert("activeSort", "default");
        params.insert("WHERE", "Coogee");

        assert_eq!(params.len(), 2);
        assert_eq!(params.get("Where"), Some("Coogee"));
        let keys: Vec<&str> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["where", "activeSort"]);
    }

    #[test]
    fn merge_overlays_values() {
        let mut base: QueryParameters = [("source", "refine"), ("activeSort", "default")]
            .into_iter()
            .collect();
        let extra: QueryParameters = [("ACTIVESORT", "price-asc"), ("maxBeds", "3")]
            .into_iter()
            .collect();
        base.merge(&extra);

        assert_eq!(base.get("activesort"), Some("price-asc"));
        assert_eq!(base.get("maxBeds"), Some("3"));
        assert_eq!(base.len(), 3);
    }
}
