use daily_close::{
    config::{Config, MapperSettings},
    data::{loader::Preprocessor, DataError},
    pipeline::{
        mapper::Mapper,
        reducer::{GroupOrder, Reducer},
        run_pipeline,
    },
};
use std::fs;
use tempfile::NamedTempFile;

fn map(input: &str) -> String {
    let mut out = Vec::new();
    Mapper::new(&MapperSettings::default())
        .run(input.as_bytes(), &mut out)
        .expect("mapper failed");
    String::from_utf8(out).unwrap()
}

fn reduce(input: &str, order: GroupOrder) -> String {
    let mut out = Vec::new();
    Reducer::new(2, order)
        .run(input.as_bytes(), &mut out)
        .expect("reducer failed");
    String::from_utf8(out).unwrap()
}

/// Line sort as done by `sort` between the streaming stages.
fn sort_lines(input: &str) -> String {
    let mut lines: Vec<&str> = input.lines().collect();
    lines.sort();
    lines.iter().map(|l| format!("{l}\n")).collect()
}

fn preprocess_fixture() -> String {
    let output = NamedTempFile::new().unwrap();
    let summary = Preprocessor::new(3)
        .preprocess_file("tests/data/raw_prices.csv", output.path())
        .expect("preprocess failed");

    assert_eq!(summary.rows_read, 7);
    assert_eq!(summary.rows_dropped, 2);
    assert_eq!(summary.rows_written, 5);
    assert_eq!(summary.preview.len(), 3);

    fs::read_to_string(output.path()).unwrap()
}

#[test]
fn test_preprocess_fixture() {
    let cleaned = preprocess_fixture();
    let lines: Vec<&str> = cleaned.lines().collect();
    assert_eq!(
        lines,
        vec![
            "Date,Open,High,Low,Close,Volume",
            "2012-01-01 10:01:00,4.58,4.58,4.58,4.58,0.0",
            "2012-01-01 10:02:00,4.58,4.6,4.58,4.6,1.5",
            "2012-01-02 00:00:00,4.84,4.84,4.84,4.84,10.0",
            "2012-01-02 00:01:00,4.86,4.86,4.86,4.86,2.0",
            "2012-01-03 00:00:00,5.0,5.0,5.0,5.0,1.0",
        ]
    );
}

#[test]
fn test_end_to_end_streaming_stages() {
    let cleaned = preprocess_fixture();
    let mapped = map(&cleaned);
    assert_eq!(
        mapped,
        "2012-01-01\t4.58\n2012-01-01\t4.6\n2012-01-02\t4.84\n2012-01-02\t4.86\n2012-01-03\t5.0\n"
    );

    let averages = reduce(&sort_lines(&mapped), GroupOrder::Contiguous);
    assert_eq!(averages, "2012-01-01\t4.59\n2012-01-02\t4.85\n2012-01-03\t5.00\n");
}

#[test]
fn test_in_process_pipeline_matches_streaming_stages() {
    let cleaned = preprocess_fixture();
    let mut out = Vec::new();
    run_pipeline(cleaned.as_bytes(), &mut out, &Config::default()).unwrap();

    let streamed = reduce(&sort_lines(&map(&cleaned)), GroupOrder::Contiguous);
    assert_eq!(String::from_utf8(out).unwrap(), streamed);
}

#[test]
fn test_map_reduce_is_idempotent_on_sorted_input() {
    let input = "2023-01-01 00:00,1,1,1,100,1\n\
                 2023-01-01 00:01,1,1,1,101.5,1\n\
                 2023-01-02 00:00,1,1,1,99,1\n";
    let first = reduce(&map(input), GroupOrder::Contiguous);
    let second = reduce(&map(input), GroupOrder::Contiguous);
    assert_eq!(first, second);
    assert_eq!(first, "2023-01-01\t100.75\n2023-01-02\t99.00\n");
}

#[test]
fn test_interleaved_dates_need_sorting() {
    let mapped = "2023-01-01\t10.0\n2023-01-02\t20.0\n2023-01-01\t30.0\n";
    assert_eq!(
        reduce(mapped, GroupOrder::Contiguous),
        "2023-01-01\t10.00\n2023-01-02\t20.00\n2023-01-01\t30.00\n"
    );
    assert_eq!(
        reduce(mapped, GroupOrder::SortByDate),
        "2023-01-01\t20.00\n2023-01-02\t20.00\n"
    );
}

#[test]
fn test_reducer_rejects_line_without_tab() {
    let mut out = Vec::new();
    let err = Reducer::new(2, GroupOrder::Contiguous)
        .run("2023-01-01 105.0\n".as_bytes(), &mut out)
        .unwrap_err();
    assert!(matches!(err, DataError::MalformedPair { line: 1, .. }));
}

#[test]
fn test_config_file_drives_stages() {
    let config_file = NamedTempFile::new().unwrap();
    fs::write(
        config_file.path(),
        "mapper:\n  header_token: Timestamp\nreducer:\n  decimals: 1\n",
    )
    .unwrap();
    let config = Config::load(config_file.path()).unwrap();

    let mut out = Vec::new();
    let summary = run_pipeline(
        "Timestamp,a,b,c,Close\n2023-01-01 00:00,0,0,0,1.26\n".as_bytes(),
        &mut out,
        &config,
    )
    .unwrap();
    assert_eq!(summary.map.headers, 1);
    assert_eq!(String::from_utf8(out).unwrap(), "2023-01-01\t1.3\n");
}
