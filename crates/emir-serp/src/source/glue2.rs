// GLUE2 schema constants and the mapping onto registry field names

use std::collections::HashMap;

use serde_json::Value;

use crate::entry::ServiceEntry;

/// Selects every service and endpoint object below the search base
pub const FILTER: &str = "(|(objectClass=GLUE2Service)(objectClass=GLUE2Endpoint))";

pub(crate) const OBJECT_CLASS: &str = "objectClass";
pub(crate) const SERVICE_CLASS: &str = "GLUE2Service";
pub(crate) const ENDPOINT_CLASS: &str = "GLUE2Endpoint";
pub(crate) const SERVICE_ID: &str = "GLUE2ServiceID";
pub(crate) const SERVICE_FOREIGN_KEY: &str = "GLUE2EndpointServiceForeignKey";

const CAPABILITY: &str = "GLUE2EndpointCapability";

/// Attributes requested from the directory service
pub const SEARCH_ATTRIBUTES: &[&str] = &[
	OBJECT_CLASS,
	SERVICE_ID,
	"GLUE2ServiceType",
	"GLUE2EntityName",
	"GLUE2EntityValidity",
	"GLUE2EndpointID",
	"GLUE2EndpointURL",
	CAPABILITY,
	"GLUE2EndpointInterfaceName",
	"GLUE2EndpointInterfaceVersion",
	"GLUE2EndpointTechnology",
	"GLUE2EndpointHealthState",
	"GLUE2EndpointServingState",
	"GLUE2EndpointQualityLevel",
	SERVICE_FOREIGN_KEY,
];

/// GLUE2 attribute name to registry field name
pub const ATTRIBUTE_MAP: &[(&str, &str)] = &[
	(SERVICE_ID, "Service_ID"),
	("GLUE2ServiceType", "Service_Type"),
	("GLUE2EntityName", "Service_Name"),
	("GLUE2EntityValidity", "Service_Validity"),
	("GLUE2EndpointID", "Service_Endpoint_ID"),
	("GLUE2EndpointURL", "Service_Endpoint_URL"),
	(CAPABILITY, "Service_Endpoint_Capability"),
	("GLUE2EndpointInterfaceName", "Service_Endpoint_InterfaceName"),
	("GLUE2EndpointInterfaceVersion", "Service_Endpoint_InterfaceVersion"),
	("GLUE2EndpointTechnology", "Service_Endpoint_Technology"),
	("GLUE2EndpointHealthState", "Service_Endpoint_HealthState"),
	("GLUE2EndpointServingState", "Service_Endpoint_ServingState"),
	("GLUE2EndpointQualityLevel", "Service_Endpoint_QualityLevel"),
];

/// Look up a multi-valued attribute ignoring the case of its name.
///
/// LDAP attribute descriptions are case-insensitive and servers do not always echo
/// the spelling used in the request.
pub(crate) fn attribute<'a>(attrs: &'a HashMap<String, Vec<String>>, name: &str) -> Option<&'a [String]> {
	attrs
		.iter()
		.find(|(key, _)| key.eq_ignore_ascii_case(name))
		.map(|(_, values)| values.as_slice())
}

/// Translate GLUE2 attributes into a registry entry.
///
/// Unmapped attributes are dropped. The capability list stays a list; every other
/// attribute contributes its first value only.
pub fn remap_attributes(attrs: &HashMap<String, Vec<String>>) -> ServiceEntry {
	let mut entry = ServiceEntry::new();
	// Walk the table rather than the input so the output field order is stable
	for (glue, field) in ATTRIBUTE_MAP {
		let Some(values) = attribute(attrs, glue) else {
			continue;
		};
		let value = if glue.eq_ignore_ascii_case(CAPABILITY) {
			Value::Array(values.iter().cloned().map(Value::String).collect())
		} else {
			match values.first() {
				Some(first) => Value::String(first.clone()),
				None => continue,
			}
		};
		entry.insert(field.to_string(), value);
	}
	entry
}
