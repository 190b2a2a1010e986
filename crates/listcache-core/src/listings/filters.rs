use serde::{Deserialize, Serialize};

/// Listing search criteria. Unset fields do not constrain the search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListingFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    /// Matches either the `property_type` or the legacy `type` column.
    #[serde(skip_serializing_if = "Option::is_none", alias = "type")]
    pub property_type: Option<String>,
    /// Minimum number of bedrooms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<u32>,
    /// Minimum number of bathrooms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bathrooms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_price: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price: Option<u64>,
    /// Case-insensitive substring of the location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_area: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_area: Option<u64>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl ListingFilters {
    /// REST query parameters, newest listings first.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = vec![("select".to_string(), "*".to_string())];
        let mut push = |column: &str, value: String| query.push((column.to_string(), value));

        if let Some(operation) = non_empty(&self.operation) {
            push("operation", format!("eq.{}", operation));
        }
        if let Some(kind) = non_empty(&self.property_type) {
            push("or", format!("(property_type.eq.{0},type.eq.{0})", kind));
        }
        if let Some(n) = self.bedrooms {
            push("bedrooms", format!("gte.{}", n));
        }
        if let Some(n) = self.bathrooms {
            push("bathrooms", format!("gte.{}", n));
        }
        if let Some(n) = self.min_price {
            push("price", format!("gte.{}", n));
        }
        if let Some(n) = self.max_price {
            push("price", format!("lte.{}", n));
        }
        if let Some(location) = non_empty(&self.location) {
            push("location", format!("ilike.*{}*", location));
        }
        if let Some(n) = self.min_area {
            push("area", format!("gte.{}", n));
        }
        if let Some(n) = self.max_area {
            push("area", format!("lte.{}", n));
        }

        query.push(("order".to_string(), "created_at.desc".to_string()));
        query
    }

    /// Distinct filter sets get distinct keys; unset fields are omitted.
    pub fn cache_key(&self) -> String {
        format!(
            "search_{}",
            serde_json::to_string(self).unwrap_or_default()
        )
    }
}
