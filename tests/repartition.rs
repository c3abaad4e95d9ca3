mod common;

use chrono::{TimeDelta, TimeZone, Utc};

use common::TestHelper;
use s3relay::Config;
use s3relay::types::{ErrorClass, TransferStatus};

#[tokio::test]
async fn destination_template_renders_extracted_and_run_fields() {
    TestHelper::init_dummy_tracing_subscriber();

    let run_time = Utc.with_ymd_and_hms(2024, 3, 15, 6, 30, 0).unwrap();
    let mut helper = TestHelper::new();
    helper.put_source_object(
        "eu/2024/03/orders.csv",
        b"id,total",
        run_time - TimeDelta::hours(1),
    );
    let config = Config::new(
        TestHelper::source_location(Some("{region}/{year}/{month}/{name}")),
        vec![helper.destination_location(
            "archive",
            Some("region={region}/loaded={date}/{name}"),
            false,
        )],
    );

    let summary = helper
        .pipeline(config)
        .with_run_time(run_time)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(
        helper.destination_keys("archive"),
        vec!["region=eu/loaded=2024-03-15/orders.csv"]
    );
}

#[tokio::test]
async fn templates_apply_only_when_both_sides_have_one() {
    TestHelper::init_dummy_tracing_subscriber();

    let mut helper = TestHelper::new();
    helper.put_source_object("2024/03/a.csv", b"a", Utc::now());
    let config = Config::new(
        TestHelper::source_location(Some("{year}/{month}/{name}")),
        vec![
            helper.destination_location("partitioned", Some("y={year}/{name}"), false),
            helper.destination_location("mirror", None, false),
        ],
    );

    let summary = helper.pipeline(config).run().await.unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(helper.destination_keys("partitioned"), vec!["y=2024/a.csv"]);
    assert_eq!(helper.destination_keys("mirror"), vec!["2024/03/a.csv"]);
}

#[tokio::test]
async fn destination_template_without_source_template_is_ignored() {
    TestHelper::init_dummy_tracing_subscriber();

    let mut helper = TestHelper::new();
    helper.put_source_object("2024/03/a.csv", b"a", Utc::now());
    let config = Config::new(
        TestHelper::source_location(None),
        vec![helper.destination_location("archive", Some("y={year}/{name}"), false)],
    );

    let summary = helper.pipeline(config).run().await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(helper.destination_keys("archive"), vec!["2024/03/a.csv"]);
}

#[tokio::test]
async fn key_not_matching_source_template_fails_alone() {
    TestHelper::init_dummy_tracing_subscriber();

    let mut helper = TestHelper::new();
    helper.put_source_object("2024/03/a.csv", b"a", Utc::now());
    helper.put_source_object("misc.csv", b"misc", Utc::now());
    let config = Config::new(
        TestHelper::source_location(Some("{year}/{month}/{name}")),
        vec![
            helper.destination_location("partitioned", Some("y={year}/{name}"), false),
            helper.destination_location("mirror", None, false),
        ],
    );

    let summary = helper.pipeline(config).run().await.unwrap();

    assert_eq!(summary.objects, 2);
    assert_eq!(summary.total, 4);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 1);

    let failure = &summary.failures[0];
    assert_eq!(failure.relpath, "misc.csv");
    assert_eq!(failure.destination, "partitioned");
    assert_eq!(failure.destination_key, None);
    assert_eq!(failure.status, TransferStatus::Failed);
    assert_eq!(failure.attempts, 0);
    assert_eq!(failure.error_class, Some(ErrorClass::KeyParse));

    assert_eq!(helper.destination_keys("partitioned"), vec!["y=2024/a.csv"]);
    assert_eq!(
        helper.destination_keys("mirror"),
        vec!["2024/03/a.csv", "misc.csv"]
    );
}

#[tokio::test]
async fn missing_field_is_reported() {
    TestHelper::init_dummy_tracing_subscriber();

    let mut helper = TestHelper::new();
    helper.put_source_object("2024/03/a.csv", b"a", Utc::now());
    let config = Config::new(
        TestHelper::source_location(Some("{year}/{month}/{name}")),
        vec![helper.destination_location("archive", Some("{tenant}/{name}"), false)],
    );

    let summary = helper.pipeline(config).run().await.unwrap();

    let failure = &summary.failures[0];
    assert_eq!(failure.status, TransferStatus::Failed);
    assert_eq!(failure.attempts, 0);
    assert_eq!(failure.error_class, Some(ErrorClass::MissingField));
    assert!(failure.error.as_ref().unwrap().contains("tenant"));
    assert!(helper.destination_keys("archive").is_empty());
}

#[tokio::test]
async fn objects_outside_time_window_are_skipped() {
    TestHelper::init_dummy_tracing_subscriber();

    let run_time = Utc.with_ymd_and_hms(2024, 3, 15, 6, 30, 0).unwrap();
    let mut helper = TestHelper::new();
    helper.put_source_object("fresh.csv", b"f", run_time - TimeDelta::hours(2));
    helper.put_source_object("stale.csv", b"s", run_time - TimeDelta::days(3));
    let config = Config::new(
        TestHelper::source_location(None),
        vec![helper.destination_location("archive", None, false)],
    );

    let summary = helper
        .pipeline(config.clone())
        .with_run_time(run_time)
        .run()
        .await
        .unwrap();
    assert_eq!(summary.objects, 1);
    assert_eq!(helper.destination_keys("archive"), vec!["fresh.csv"]);

    let mut backfill = config;
    backfill.listing_config.backfill = true;
    let summary = helper
        .pipeline(backfill)
        .with_run_time(run_time)
        .run()
        .await
        .unwrap();
    assert_eq!(summary.objects, 2);
    assert_eq!(
        helper.destination_keys("archive"),
        vec!["fresh.csv", "stale.csv"]
    );
}
