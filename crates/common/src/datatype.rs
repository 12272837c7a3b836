use serde_json::Value;

/// Data types a field can be annotated with. Cast coerces incoming filter
/// values before they are bound into queries; truncate bounds masked output
/// to a declared column length.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
	String,
	Integer,
	Float,
	Boolean,
	ObjectId,
}

impl DataType {
	pub fn from_name(name: &str) -> Option<Self> {
		match name {
			"string" => Some(DataType::String),
			"integer" => Some(DataType::Integer),
			"float" => Some(DataType::Float),
			"boolean" => Some(DataType::Boolean),
			"object_id" => Some(DataType::ObjectId),
			_ => None,
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			DataType::String => "string",
			DataType::Integer => "integer",
			DataType::Float => "float",
			DataType::Boolean => "boolean",
			DataType::ObjectId => "object_id",
		}
	}

	/// Coerce a value into this type, returning None for values that cannot
	/// be represented
	pub fn cast(&self, value: &Value) -> Option<Value> {
		match self {
			DataType::String => match value {
				Value::String(s) => Some(Value::String(s.clone())),
				Value::Number(n) => Some(Value::String(n.to_string())),
				Value::Bool(b) => Some(Value::String(b.to_string())),
				_ => None,
			},
			DataType::Integer => match value {
				Value::Number(n) =>
					n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).map(Value::from),
				Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
				Value::Bool(b) => Some(Value::from(i64::from(*b))),
				_ => None,
			},
			DataType::Float => match value {
				Value::Number(n) => n.as_f64().map(Value::from),
				Value::String(s) => s.trim().parse::<f64>().ok().map(Value::from),
				_ => None,
			},
			DataType::Boolean => match value {
				Value::Bool(b) => Some(Value::Bool(*b)),
				Value::String(s) => match s.as_str() {
					"true" | "True" => Some(Value::Bool(true)),
					"false" | "False" => Some(Value::Bool(false)),
					_ => None,
				},
				Value::Number(n) => match n.as_i64() {
					Some(0) => Some(Value::Bool(false)),
					Some(1) => Some(Value::Bool(true)),
					_ => None,
				},
				_ => None,
			},
			DataType::ObjectId => match value {
				Value::String(s)
					if s.len() == 24 && s.chars().all(|c| c.is_ascii_hexdigit()) =>
					Some(Value::String(s.clone())),
				_ => None,
			},
		}
	}

	/// Bound a masked value to a maximum length. Only string values have a
	/// meaningful length; anything else passes through unchanged
	pub fn truncate(&self, max_length: usize, value: Value) -> Value {
		match (self, value) {
			(DataType::String, Value::String(s)) =>
				Value::String(s.chars().take(max_length).collect()),
			(_, v) => v,
		}
	}
}

impl core::fmt::Display for DataType {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		write!(f, "{}", self.name())
	}
}
