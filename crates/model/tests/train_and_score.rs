//! End-to-end pipeline test: source CSVs → feature table → fitted
//! transform and model → persisted artifacts → reloaded scorer.

use anyhow::Result;
use chrono::{TimeZone, Utc};
use churnkit_features::{build_feature_table, churn_labels, NON_FEATURE_COLUMNS};
use churnkit_model::{
    classification_report, load_artifacts, save_artifacts, stratified_split, FittedTransform,
    GbdtConfig, GbdtTrainer, Scorer,
};
use churnkit_tables::load_tables;
use std::io::Write;
use std::path::Path;

fn write_file(dir: &Path, name: &str, content: &str) -> Result<()> {
    let mut file = std::fs::File::create(dir.join(name))?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

/// Twelve subscriptions; cancelled ones have low billing and a cancel log.
fn write_source_csvs(dir: &Path) -> Result<()> {
    let mut users = String::from("User Id,Country,Age\n");
    let mut subs = String::from("Subscription Id,User ID,Status,Plan\n");
    let mut logs = String::from("Subscription id,action,action date\n");
    let mut billing = String::from("subscription_id,amount,billing_date\n");

    for i in 0..12 {
        let user_id = 100 + i;
        let sub_id = i + 1;
        let cancelled = i % 3 == 0;

        users.push_str(&format!(
            "{user_id},{},{}\n",
            if i % 2 == 0 { "DE" } else { "FR" },
            20 + i
        ));
        subs.push_str(&format!(
            "{sub_id},{user_id},{},{}\n",
            if cancelled { "Cancelled" } else { "Active" },
            if i % 2 == 0 { "Gold" } else { "Silver" }
        ));
        logs.push_str(&format!("{sub_id},create,2024-01-01\n"));
        if cancelled {
            logs.push_str(&format!("{sub_id},cancel,2024-03-01\n"));
            billing.push_str(&format!("{sub_id},10,2024-01-15\n"));
        } else {
            logs.push_str(&format!("{sub_id},renew,2024-02-01\n"));
            billing.push_str(&format!("{sub_id},60,2024-01-15\n"));
            billing.push_str(&format!("{sub_id},60,2024-02-15\n"));
        }
    }

    write_file(dir, "User_Data.csv", &users)?;
    write_file(dir, "Subscriptions.csv", &subs)?;
    write_file(dir, "Subscription_Logs.csv", &logs)?;
    write_file(dir, "Billing_Information.csv", &billing)?;
    Ok(())
}

fn trainer_config() -> GbdtConfig {
    GbdtConfig {
        num_trees: 10,
        min_samples_leaf: 1,
        ..GbdtConfig::default()
    }
}

#[test]
fn test_full_pipeline_train_persist_score() -> Result<()> {
    let data_dir = tempfile::tempdir()?;
    write_source_csvs(data_dir.path())?;

    let sources = load_tables(data_dir.path())?;
    let features = build_feature_table(&sources)?;
    assert_eq!(features.len(), 12);

    let transform = FittedTransform::fit(&features, NON_FEATURE_COLUMNS)?;
    let matrix = transform.transform_table(&features)?;
    let labels = churn_labels(&features)?;

    let split = stratified_split(&labels, 0.2, 42);
    let train_matrix: Vec<Vec<f64>> = split.train.iter().map(|&i| matrix[i].clone()).collect();
    let train_labels: Vec<u8> = split.train.iter().map(|&i| labels[i]).collect();
    let model = GbdtTrainer::new(trainer_config()).train(&train_matrix, &train_labels)?;

    // Held-out diagnostics should be computable without panicking.
    let test_truth: Vec<u8> = split.test.iter().map(|&i| labels[i]).collect();
    let test_pred: Vec<u8> = split
        .test
        .iter()
        .map(|&i| model.predict(&matrix[i]))
        .collect::<Result<_, _>>()?;
    let report = classification_report(&test_truth, &test_pred);
    assert!((0.0..=1.0).contains(&report.accuracy));

    // Persist and reload; scoring must be bit-identical across the reload.
    let artifact_dir = tempfile::tempdir()?;
    save_artifacts(artifact_dir.path(), &model, &transform)?;
    let (loaded_model, loaded_transform) = load_artifacts(artifact_dir.path())?;

    let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap();
    let scorer = Scorer::new(features.clone(), transform, model);
    let reloaded = Scorer::new(features.clone(), loaded_transform, loaded_model);

    let direct = scorer.score_all(now)?;
    let from_disk = reloaded.score_all(now)?;
    assert_eq!(direct, from_disk);
    assert_eq!(direct.len(), features.len());

    // Single-user path agrees with the batch path.
    let single = scorer.score_user(100, now)?;
    assert_eq!(Some(&single), direct.first());

    Ok(())
}

#[test]
fn test_training_is_reproducible_across_runs() -> Result<()> {
    let data_dir = tempfile::tempdir()?;
    write_source_csvs(data_dir.path())?;

    let mut models = Vec::new();
    for _ in 0..2 {
        let sources = load_tables(data_dir.path())?;
        let features = build_feature_table(&sources)?;
        let transform = FittedTransform::fit(&features, NON_FEATURE_COLUMNS)?;
        let matrix = transform.transform_table(&features)?;
        let labels = churn_labels(&features)?;
        let split = stratified_split(&labels, 0.2, 42);
        let train_matrix: Vec<Vec<f64>> =
            split.train.iter().map(|&i| matrix[i].clone()).collect();
        let train_labels: Vec<u8> = split.train.iter().map(|&i| labels[i]).collect();
        models.push(GbdtTrainer::new(trainer_config()).train(&train_matrix, &train_labels)?);
    }

    assert_eq!(models[0], models[1]);
    Ok(())
}
