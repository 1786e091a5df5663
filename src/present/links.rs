//! URLs emitted by the presenters

use crate::query::FieldFilter;
use crate::scope::Scope;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters left alone inside a path segment
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode one path segment; slashes are encoded too
pub fn encode_segment(value: &str) -> String {
    utf8_percent_encode(value, SEGMENT).to_string()
}

/// Machine page owned by the enrollment UI
pub fn machine_url(machine_id: i64) -> String {
    format!("/machine_detail/{}/", machine_id)
}

pub fn application_list_url(scope: Scope) -> String {
    format!(
        "/inventory/applications/{}/{}/",
        scope.group_type(),
        scope.group_id()
    )
}

pub fn application_detail_url(scope: Scope, application_id: i64) -> String {
    format!(
        "/inventory/application/{}/{}/{}/",
        scope.group_type(),
        scope.group_id(),
        application_id
    )
}

pub fn inventory_list_url(scope: Scope, application_id: i64, field: &FieldFilter) -> String {
    format!(
        "/inventory/list/{}/{}/{}/{}",
        scope.group_type(),
        scope.group_id(),
        application_id,
        field_segments(field)
    )
}

pub fn csv_export_url(scope: Scope, application_id: i64, field: &FieldFilter) -> String {
    format!(
        "/inventory/csv_export/{}/{}/{}/{}",
        scope.group_type(),
        scope.group_id(),
        application_id,
        field_segments(field)
    )
}

/// `field_type/field_value/`, with `all/0/` standing for no constraint
fn field_segments(field: &FieldFilter) -> String {
    format!(
        "{}/{}/",
        field.field_type(),
        encode_segment(field.value().unwrap_or("0"))
    )
}
