//! End-to-end batch generation runs against the public API.
//!
//! The automation host binary is deliberately absent in every harness,
//! so these runs exercise the direct conversion fallbacks.

mod common;

use std::fs;

use common::TestHarness;
use docmill::convert::pdf;
use docmill::jobs::TemplateRef;
use docmill::ooxml::xlsx;
use docmill::{JobOrchestrator, JobStatus, OutputFormat};

#[test]
fn mixed_format_job_produces_every_deliverable() {
    let harness = TestHarness::new();
    let data = harness.data_workbook(
        "people.xlsx",
        &["name", "city"],
        &[&["Ann", "Oslo"], &["Bob", "Lima"]],
    );
    let template = harness.docx_template(
        "letter.docx",
        &["Dear ##name##,", "Greetings from ##city##."],
    );

    let mut request = harness.request(
        data,
        vec![TemplateRef::new(template)],
        vec![OutputFormat::Pdf, OutputFormat::Word, OutputFormat::Message],
    );
    request.filename_variable = Some("name".to_string());

    let job = harness.orchestrator.create(request).unwrap();
    let done = harness.orchestrator.process(&job.id).unwrap();

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.total_records, 2);
    assert_eq!(done.processed_records, 2);
    assert_eq!(done.output_files.len(), 6);

    let job_dir = harness.job_dir(&done.id);
    for name in ["Ann", "Bob"] {
        assert!(job_dir.join(format!("outputs/pdf/{}.pdf", name)).is_file());
        assert!(job_dir.join(format!("outputs/word/{}.docx", name)).is_file());
        assert!(job_dir.join(format!("outputs/eml/{}.eml", name)).is_file());
    }

    let eml = fs::read_to_string(job_dir.join("outputs/eml/Ann.eml")).unwrap();
    assert!(eml.contains("Subject: Ann"));
    assert!(eml.contains("Dear Ann,"));
    assert!(eml.contains("Greetings from Oslo."));

    let text = pdf::extract_text(&job_dir.join("outputs/pdf/Bob.pdf")).unwrap();
    assert!(text.contains("Greetings from Lima."));

    let zip_path = done.zip_file_path.as_ref().unwrap();
    let archive = zip::ZipArchive::new(fs::File::open(zip_path).unwrap()).unwrap();
    assert_eq!(archive.len(), 6);
}

#[test]
fn jobs_survive_a_restart() {
    let harness = TestHarness::new();
    let data = harness.data_workbook("people.xlsx", &["name"], &[&["Ann"]]);
    let template = harness.docx_template("letter.docx", &["Hi ##name##"]);
    let request = harness.request(
        data,
        vec![TemplateRef::new(template)],
        vec![OutputFormat::Word],
    );
    let job = harness.orchestrator.create(request).unwrap();
    harness.orchestrator.process(&job.id).unwrap();

    let reopened = JobOrchestrator::new(harness.config.clone()).unwrap();
    let reloaded = reopened.get(&job.id).unwrap();
    assert_eq!(reloaded.status, JobStatus::Completed);
    assert_eq!(reloaded.processed_records, 1);
    assert_eq!(reopened.stats().completed, 1);
}

#[test]
fn sheet_selector_limits_substitution_to_one_sheet() {
    let harness = TestHarness::new();
    let data = harness.data_workbook("people.xlsx", &["name"], &[&["Ann"]]);
    let template = harness.xlsx_template(
        "form.xlsx",
        &[
            ("Front", vec![vec!["Customer", "##name##"]]),
            ("Back", vec![vec!["Copy for", "##name##"]]),
        ],
    );

    let request = harness.request(
        data,
        vec![TemplateRef::new(template).with_sheet("Front")],
        vec![OutputFormat::Excel],
    );
    let job = harness.orchestrator.create(request).unwrap();
    let done = harness.orchestrator.process(&job.id).unwrap();
    assert_eq!(done.status, JobStatus::Completed);

    let output = harness
        .job_dir(&done.id)
        .join("outputs/excel/record_1.xlsx");
    let workbook = xlsx::Workbook::open(&output).unwrap();
    let front = workbook.sheet_by_name("Front").unwrap();
    assert_eq!(front.rows[0][1], "Ann");
    let back = workbook.sheet_by_name("Back").unwrap();
    assert_eq!(back.rows[0][1], "##name##");
}

#[test]
fn identical_tab_labels_are_suffixed() {
    let harness = TestHarness::new();
    let data = harness.data_workbook("people.xlsx", &["name"], &[&["Ann"], &["Ann"]]);
    let template = harness.xlsx_template("form.xlsx", &[("Form", vec![vec!["##name##"]])]);

    let mut request = harness.request(
        data,
        vec![TemplateRef::new(template)],
        vec![OutputFormat::ExcelWorkbook],
    );
    request.tabname_variable = Some("name".to_string());

    let job = harness.orchestrator.create(request).unwrap();
    let done = harness.orchestrator.process(&job.id).unwrap();
    assert_eq!(done.status, JobStatus::Completed);

    let workbook = xlsx::Workbook::open(
        &harness
            .job_dir(&done.id)
            .join("outputs/excel_workbook/workbook.xlsx"),
    )
    .unwrap();
    let names: Vec<&str> = workbook.sheets.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Ann", "Ann_2"]);
}

#[test]
fn finished_archives_are_delivered() {
    let harness = TestHarness::with_config_tweak(|config| {
        config.output_directory = Some(config.jobs_dir.parent().unwrap().join("delivery"));
    });
    let data = harness.data_workbook("people.xlsx", &["name"], &[&["Ann"]]);
    let template = harness.docx_template("letter.docx", &["Hi ##name##"]);

    let request = harness.request(
        data,
        vec![TemplateRef::new(template)],
        vec![OutputFormat::Word],
    );
    let job = harness.orchestrator.create(request).unwrap();
    let done = harness.orchestrator.process(&job.id).unwrap();
    assert_eq!(done.status, JobStatus::Completed);

    let delivered = harness
        .root()
        .join("delivery")
        .join(format!("job_{}_output.zip", done.id));
    assert!(delivered.is_file());
}

#[test]
fn rerun_snapshots_fresh_sources() {
    let harness = TestHarness::new();
    let data = harness.data_workbook("people.xlsx", &["name"], &[&["Ann"]]);
    let template = harness.docx_template("letter.docx", &["Hi ##name##"]);

    let request = harness.request(
        data.clone(),
        vec![TemplateRef::new(template)],
        vec![OutputFormat::Word],
    );
    let first = harness.orchestrator.create(request).unwrap();
    harness.orchestrator.process(&first.id).unwrap();

    harness.data_workbook("people.xlsx", &["name"], &[&["Ann"], &["Bob"]]);
    assert!(harness.orchestrator.check_updates(&first.id).unwrap().any());

    let second = harness.orchestrator.rerun(&first.id).unwrap();
    assert_ne!(second.id, first.id);
    assert_eq!(second.status, JobStatus::Completed);
    assert_eq!(second.total_records, 2);
}

#[test]
fn deleting_the_last_job_frees_its_snapshots() {
    let harness = TestHarness::new();
    let data = harness.data_workbook("people.xlsx", &["name"], &[&["Ann"]]);
    let template = harness.docx_template("letter.docx", &["Hi ##name##"]);

    let request = harness.request(
        data,
        vec![TemplateRef::new(template)],
        vec![OutputFormat::Word],
    );
    let job = harness.orchestrator.create(request).unwrap();
    harness.orchestrator.process(&job.id).unwrap();

    assert_eq!(harness.orchestrator.cleanup_storage().unwrap(), 0);
    harness.orchestrator.delete(&job.id).unwrap();
    assert_eq!(harness.orchestrator.cleanup_storage().unwrap(), 2);
}

#[test]
fn print_settings_ride_along_for_spreadsheet_sources() {
    let harness = TestHarness::new();
    let data = harness.data_workbook("people.xlsx", &["name"], &[&["Ann"]]);
    let template = harness.xlsx_template("form.xlsx", &[("Form", vec![vec!["##name##"]])]);

    let mut request = harness.request(
        data,
        vec![TemplateRef::new(template)],
        vec![OutputFormat::Pdf],
    );
    request.excel_print_settings = Some(docmill::PrintSettings {
        orientation: Some(docmill::convert::Orientation::Landscape),
        ..docmill::PrintSettings::default()
    });

    let job = harness.orchestrator.create(request).unwrap();
    let done = harness.orchestrator.process(&job.id).unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert!(harness
        .job_dir(&done.id)
        .join("outputs/pdf/record_1.pdf")
        .is_file());
}
