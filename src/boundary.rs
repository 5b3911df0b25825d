//! Access-boundary policy modeling.
//!
//! An [`AccessBoundary`] lists the [`AccessBoundaryRule`]s a downscoped token is limited to. Each
//! rule names one resource, the roles grantable on it, and an optional CEL
//! [`AvailabilityCondition`] that narrows the rule further (for example to an object-name
//! prefix). Rule contents are not interpreted locally; the token service validates them during
//! the exchange.

// crates.io
use serde_json::{Map, Value};
// self
use crate::{_prelude::*, error::ConfigError};

const RULES_KEY: &str = "accessBoundaryRules";
const ENVELOPE_KEY: &str = "accessBoundary";

/// CEL condition that restricts where a rule applies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityCondition {
	/// Short label for the condition.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	/// CEL expression evaluated by the token service.
	pub expression: String,
	/// Free-form description.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
}
impl AvailabilityCondition {
	/// Creates a condition from its CEL expression.
	pub fn new(expression: impl Into<String>) -> Self {
		Self { title: None, expression: expression.into(), description: None }
	}

	/// Sets the condition title.
	pub fn with_title(mut self, title: impl Into<String>) -> Self {
		self.title = Some(title.into());

		self
	}

	/// Sets the condition description.
	pub fn with_description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());

		self
	}
}

/// One resource plus the permissions a downscoped token may exercise on it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessBoundaryRule {
	/// Full resource name, e.g. `//storage.googleapis.com/projects/_/buckets/b1`.
	pub available_resource: String,
	/// Roles granted on the resource, e.g. `inRole:roles/storage.objectViewer`.
	pub available_permissions: Vec<String>,
	/// Optional condition narrowing the rule.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub availability_condition: Option<AvailabilityCondition>,
}
impl AccessBoundaryRule {
	/// Creates a rule for `resource` with no permissions yet.
	pub fn new(resource: impl Into<String>) -> Self {
		Self {
			available_resource: resource.into(),
			available_permissions: Vec::new(),
			availability_condition: None,
		}
	}

	/// Appends one permission, keeping insertion order.
	pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
		self.available_permissions.push(permission.into());

		self
	}

	/// Appends several permissions, keeping insertion order.
	pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.available_permissions.extend(permissions.into_iter().map(Into::into));

		self
	}

	/// Attaches an availability condition.
	pub fn with_condition(mut self, condition: AvailabilityCondition) -> Self {
		self.availability_condition = Some(condition);

		self
	}
}

/// Validated access-boundary policy.
///
/// Deserializing accepts the same documents as [`AccessBoundary::from_json_value`], so a policy
/// can be embedded directly in host configuration files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct AccessBoundary {
	#[serde(rename = "accessBoundaryRules")]
	rules: Vec<AccessBoundaryRule>,
}
impl AccessBoundary {
	/// Builds a policy from typed rules; at least one rule is required.
	pub fn new<I>(rules: I) -> Result<Self, ConfigError>
	where
		I: IntoIterator<Item = AccessBoundaryRule>,
	{
		let rules = rules.into_iter().collect::<Vec<_>>();

		if rules.is_empty() {
			return Err(ConfigError::EmptyAccessBoundaryRules);
		}

		Ok(Self { rules })
	}

	/// Parses a policy document.
	///
	/// Both the bare `{"accessBoundaryRules": [...]}` form and the
	/// `{"accessBoundary": {"accessBoundaryRules": [...]}}` envelope are accepted. A document
	/// without the rules key fails with [`ConfigError::MissingAccessBoundaryRules`] whatever else
	/// it contains.
	pub fn from_json_value(value: Value) -> Result<Self, ConfigError> {
		let Value::Object(object) = value else {
			return Err(ConfigError::MissingAccessBoundaryRules);
		};
		let mut object = unwrap_envelope(object);
		let rules = object.remove(RULES_KEY).ok_or(ConfigError::MissingAccessBoundaryRules)?;
		let rules: Vec<AccessBoundaryRule> = serde_path_to_error::deserialize(rules)
			.map_err(|source| ConfigError::InvalidAccessBoundary { source })?;

		Self::new(rules)
	}

	/// Parses a policy document from JSON text.
	pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
		let mut de = serde_json::Deserializer::from_str(raw);
		let value: Value = serde_path_to_error::deserialize(&mut de)
			.map_err(|source| ConfigError::InvalidAccessBoundary { source })?;

		Self::from_json_value(value)
	}

	/// Rules in the order they were supplied.
	pub fn rules(&self) -> &[AccessBoundaryRule] {
		&self.rules
	}

	/// Number of rules.
	pub fn len(&self) -> usize {
		self.rules.len()
	}

	/// Always `false` for a validated policy; provided for API symmetry with `len`.
	pub fn is_empty(&self) -> bool {
		self.rules.is_empty()
	}

	/// Renders the compact JSON document sent as the `access_boundary` form field.
	pub fn to_json(&self) -> Result<String, ConfigError> {
		serde_json::to_string(self).map_err(ConfigError::BoundarySerialize)
	}
}
impl TryFrom<Value> for AccessBoundary {
	type Error = ConfigError;

	fn try_from(value: Value) -> Result<Self, Self::Error> {
		Self::from_json_value(value)
	}
}
impl FromStr for AccessBoundary {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::from_json_str(s)
	}
}

fn unwrap_envelope(mut object: Map<String, Value>) -> Map<String, Value> {
	if object.contains_key(RULES_KEY) {
		return object;
	}

	match object.remove(ENVELOPE_KEY) {
		Some(Value::Object(inner)) => inner,
		_ => object,
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	const BUCKET: &str = "//storage.googleapis.com/projects/_/buckets/b1";
	const VIEWER: &str = "inRole:roles/storage.objectViewer";

	#[test]
	fn missing_rules_key_is_rejected_for_any_other_content() {
		let documents = [
			json!({}),
			json!({ "rules": [] }),
			json!({ "availableResource": BUCKET }),
			json!({ "accessBoundary": {} }),
			json!({ "accessBoundary": "not-an-object" }),
			json!([{ "accessBoundaryRules": [] }]),
			json!(null),
			json!("accessBoundaryRules"),
		];

		for document in documents {
			let err = AccessBoundary::from_json_value(document.clone())
				.expect_err("Documents without accessBoundaryRules must be rejected.");

			assert!(
				matches!(err, ConfigError::MissingAccessBoundaryRules),
				"Unexpected error for {document}: {err:?}."
			);
		}
	}

	#[test]
	fn empty_rule_list_is_rejected() {
		let err = AccessBoundary::from_json_value(json!({ "accessBoundaryRules": [] }))
			.expect_err("Empty rule lists must be rejected.");

		assert!(matches!(err, ConfigError::EmptyAccessBoundaryRules));
		assert!(matches!(
			AccessBoundary::new([]).expect_err("Typed construction must reject empty rules."),
			ConfigError::EmptyAccessBoundaryRules
		));
	}

	#[test]
	fn malformed_rules_report_the_offending_path() {
		let err = AccessBoundary::from_json_value(json!({
			"accessBoundaryRules": [{ "availableResource": BUCKET, "availablePermissions": "x" }]
		}))
		.expect_err("Permissions must be a list.");
		let ConfigError::InvalidAccessBoundary { source } = err else {
			panic!("Expected a structured parse failure.");
		};

		assert_eq!(source.path().to_string(), "[0].availablePermissions");
	}

	#[test]
	fn envelope_and_bare_documents_parse_identically() {
		let bare = json!({
			"accessBoundaryRules": [{ "availableResource": BUCKET, "availablePermissions": [VIEWER] }]
		});
		let wrapped = json!({ "accessBoundary": bare.clone() });

		assert_eq!(
			AccessBoundary::from_json_value(bare).expect("Bare document should parse."),
			AccessBoundary::from_json_value(wrapped).expect("Enveloped document should parse."),
		);
	}

	#[test]
	fn serialization_keeps_rule_order_and_omits_absent_conditions() {
		let boundary = AccessBoundary::new([
			AccessBoundaryRule::new(BUCKET).with_permission(VIEWER),
			AccessBoundaryRule::new("//storage.googleapis.com/projects/_/buckets/b2")
				.with_permissions([VIEWER, "inRole:roles/storage.objectCreator"])
				.with_condition(
					AvailabilityCondition::new(
						"resource.name.startsWith(\"projects/_/buckets/b2/objects/foo\")",
					)
					.with_title("obj-prefixes"),
				),
		])
		.expect("Typed policy should build.");
		let rendered = boundary.to_json().expect("Policy should serialize.");

		assert_eq!(
			rendered,
			concat!(
				r#"{"accessBoundaryRules":["#,
				r#"{"availableResource":"//storage.googleapis.com/projects/_/buckets/b1","availablePermissions":["inRole:roles/storage.objectViewer"]},"#,
				r#"{"availableResource":"//storage.googleapis.com/projects/_/buckets/b2","availablePermissions":["inRole:roles/storage.objectViewer","inRole:roles/storage.objectCreator"],"#,
				r#""availabilityCondition":{"title":"obj-prefixes","expression":"resource.name.startsWith(\"projects/_/buckets/b2/objects/foo\")"}}"#,
				"]}",
			)
		);
	}

	#[test]
	fn condition_title_is_optional() {
		let boundary: AccessBoundary = r#"{"accessBoundaryRules":[{
			"availableResource":"//storage.googleapis.com/projects/_/buckets/b1",
			"availablePermissions":["inRole:roles/storage.objectViewer"],
			"availabilityCondition":{"expression":"resource.name.startsWith(\"a\")"}
		}]}"#
			.parse()
			.expect("Conditions without a title should parse.");
		let condition = boundary.rules()[0]
			.availability_condition
			.as_ref()
			.expect("Condition should be retained.");

		assert!(condition.title.is_none());
		assert_eq!(condition.expression, "resource.name.startsWith(\"a\")");
	}

	#[test]
	fn deserialize_routes_through_validation() {
		let err = serde_json::from_value::<AccessBoundary>(json!({ "other": 1 }))
			.expect_err("Serde path must apply the same validation.");

		assert!(err.to_string().contains("missing accessBoundaryRules key"));
	}

	#[test]
	fn invalid_json_text_is_a_config_error() {
		let err = AccessBoundary::from_json_str("{\"accessBoundaryRules\": [")
			.expect_err("Truncated JSON must fail.");

		assert!(matches!(err, ConfigError::InvalidAccessBoundary { .. }));
	}
}
