use chrono::{DateTime, Utc};

/// Builds PostgREST paths such as
/// `/rest/v1/patient_visits?branch_id=eq.abc&current_stage=eq.nurse&order=stage_entered_at.asc`.
#[derive(Debug, Clone)]
pub struct RestQuery {
    table: String,
    parts: Vec<String>,
}

impl RestQuery {
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            parts: Vec::new(),
        }
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.parts.push(format!("{}=eq.{}", column, encode(&value.to_string())));
        self
    }

    pub fn eq_opt(self, column: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.eq(column, v),
            None => self,
        }
    }

    pub fn neq(mut self, column: &str, value: impl ToString) -> Self {
        self.parts.push(format!("{}=neq.{}", column, encode(&value.to_string())));
        self
    }

    pub fn in_list(mut self, column: &str, values: &[String]) -> Self {
        let joined = values.iter().map(|v| encode(v)).collect::<Vec<_>>().join(",");
        self.parts.push(format!("{}=in.({})", column, joined));
        self
    }

    pub fn not_null(mut self, column: &str) -> Self {
        self.parts.push(format!("{}=not.is.null", column));
        self
    }

    pub fn gte(mut self, column: &str, at: DateTime<Utc>) -> Self {
        self.parts.push(format!("{}=gte.{}", column, encode(&at.to_rfc3339())));
        self
    }

    pub fn lt(mut self, column: &str, at: DateTime<Utc>) -> Self {
        self.parts.push(format!("{}=lt.{}", column, encode(&at.to_rfc3339())));
        self
    }

    pub fn ilike(mut self, column: &str, needle: &str) -> Self {
        self.parts.push(format!("{}=ilike.*{}*", column, encode(needle)));
        self
    }

    /// `or=(first_name.ilike."*x*",last_name.ilike."*x*")`. The term is quoted
    /// so commas and parentheses in it stay inside the value.
    pub fn or_ilike(mut self, columns: &[&str], needle: &str) -> Self {
        let escaped = needle.replace('\\', "\\\\").replace('"', "\\\"");
        let encoded = encode(&format!("\"*{}*\"", escaped));
        let clauses = columns
            .iter()
            .map(|c| format!("{}.ilike.{}", c, encoded))
            .collect::<Vec<_>>()
            .join(",");
        self.parts.push(format!("or=({})", clauses));
        self
    }

    pub fn order(mut self, spec: &str) -> Self {
        self.parts.push(format!("order={}", spec));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.parts.push(format!("limit={}", limit));
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.parts.push(format!("offset={}", offset));
        self
    }

    pub fn build(&self) -> String {
        if self.parts.is_empty() {
            format!("/rest/v1/{}", self.table)
        } else {
            format!("/rest/v1/{}?{}", self.table, self.parts.join("&"))
        }
    }
}

fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}
