use askama::Template;
use il_core::report::AdminReport;

#[derive(Template)]
#[template(path = "admin.html")]
pub struct AdminTemplate<'a> {
    pub report: &'a AdminReport,
    pub title: &'a str,
}
