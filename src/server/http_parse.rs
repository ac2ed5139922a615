use crate::domain::{ExportFormat, FieldType, TestimonialStatus};

pub(super) fn parse_testimonial_status(status: &str) -> Option<TestimonialStatus> {
    match status {
        "pending" => Some(TestimonialStatus::Pending),
        "approved" => Some(TestimonialStatus::Approved),
        "rejected" => Some(TestimonialStatus::Rejected),
        _ => None,
    }
}

pub(super) fn parse_export_format(format: &str) -> Option<ExportFormat> {
    match format {
        "csv" => Some(ExportFormat::Csv),
        "json" => Some(ExportFormat::Json),
        "widget" => Some(ExportFormat::Widget),
        "social" => Some(ExportFormat::Social),
        _ => None,
    }
}

pub(super) fn parse_field_type(field_type: &str) -> Option<FieldType> {
    field_type.parse().ok()
}

pub(super) const STATUS_VALUES: [&str; 3] = ["pending", "approved", "rejected"];
pub(super) const FORMAT_VALUES: [&str; 4] = ["csv", "json", "widget", "social"];
pub(super) const FIELD_TYPE_VALUES: [&str; 8] = [
    "text", "textarea", "select", "radio", "checkbox", "rating", "email", "url",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_inputs() {
        for status in STATUS_VALUES {
            assert!(parse_testimonial_status(status).is_some());
        }
        for format in FORMAT_VALUES {
            assert!(parse_export_format(format).is_some());
        }
        for field_type in FIELD_TYPE_VALUES {
            assert!(parse_field_type(field_type).is_some(), "{}", field_type);
        }
    }

    #[test]
    fn parse_invalid_inputs_return_none() {
        assert!(parse_testimonial_status("archived").is_none());
        assert!(parse_export_format("pdf").is_none());
        assert!(parse_field_type("date").is_none());
    }
}
