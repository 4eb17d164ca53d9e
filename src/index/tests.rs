#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    use crate::error::{IndexError, PrepareStage};
    use crate::index::manifest::{PrepareManifest, PreparePhase};
    use crate::index::{prepare_index, ArtifactPaths, IndexConfig, IndexPreparer};

    fn record(first: &str, zip: &str, email: &str) -> String {
        format!(
            "\"{}\",\"Doe\",\"Acme\",\"1 Main St\",\"Town\",\"County\",\"NJ\",\"{}\",\"555-0100\",\"555-0101\",\"{}\",\"http://acme.example\"",
            first, zip, email
        )
    }

    fn sample_lines() -> Vec<String> {
        vec![
            record("Alisha", "08846", "alisha@slusarski.com"),
            record("Mattie", "85013", "mattie@aol.com"),
            record("Bob", "08846", "bob@example.com"),
            record("Carol", "10001", "carol@example.com"),
            record("Dave", "85013", "dave@example.com"),
        ]
    }

    fn write_source(dir: &Path, lines: &[String]) -> std::path::PathBuf {
        let path = dir.join("people.csv");
        let mut content = lines.join("\n");
        content.push('\n');
        fs::write(&path, content).unwrap();
        path
    }

    fn test_config(dir: &Path) -> IndexConfig {
        IndexConfig {
            work_directory: Some(dir.join("work")),
            processing_threads: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_pipeline_produces_query_artifacts() {
        let temp_dir = tempdir().unwrap();
        let source = write_source(temp_dir.path(), &sample_lines());

        let prepared = prepare_index(&source, test_config(temp_dir.path())).unwrap();

        assert!(prepared.manifest.is_complete());
        assert_eq!(prepared.manifest.stats.records_indexed, 5);
        assert_eq!(prepared.manifest.stats.distinct_zip_codes, 3);
        assert_eq!(prepared.zip_index.len(), 3);
        assert_eq!(prepared.directory.len(), 1);
        assert!(prepared.manifest.reordered_file.exists());
        assert!(prepared.manifest.zip_index_file.exists());

        let saved = PrepareManifest::load(&prepared.manifest_path).unwrap();
        assert_eq!(saved.phase, PreparePhase::Completed);
        assert_eq!(saved.email_shards.len(), 1);

        // Only the final artifacts survive
        let paths = ArtifactPaths::new(&source, &prepared.manifest.work_directory);
        assert!(!paths.zip_entries.exists());
        assert!(!paths.zip_grouped.exists());
        assert!(!paths.merged_email.exists());
        let leftovers: Vec<_> = fs::read_dir(&paths.work_directory)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("email_raw_"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_keep_intermediate_files() {
        let temp_dir = tempdir().unwrap();
        let source = write_source(temp_dir.path(), &sample_lines());
        let config = IndexConfig {
            keep_intermediate_files: true,
            ..test_config(temp_dir.path())
        };

        let prepared = prepare_index(&source, config).unwrap();

        let paths = ArtifactPaths::new(&source, &prepared.manifest.work_directory);
        assert!(paths.zip_entries.exists());
        assert!(paths.zip_grouped.exists());
        assert!(paths.merged_email.exists());
    }

    #[test]
    fn test_reordered_file_is_a_permutation_of_the_source() {
        let temp_dir = tempdir().unwrap();
        let mut lines = sample_lines();
        lines.insert(2, "too,few,fields".to_string());
        let source = write_source(temp_dir.path(), &lines);

        let prepared = prepare_index(&source, test_config(temp_dir.path())).unwrap();
        assert_eq!(prepared.manifest.stats.lines_skipped, 1);

        let reordered = fs::read_to_string(&prepared.manifest.reordered_file).unwrap();
        let mut expected: Vec<&str> = lines.iter().map(String::as_str).filter(|l| *l != "too,few,fields").collect();
        let mut actual: Vec<&str> = reordered.lines().collect();
        expected.sort_unstable();
        actual.sort_unstable();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_zip_span_covers_every_occurrence() {
        let temp_dir = tempdir().unwrap();
        let lines = sample_lines();
        let source = write_source(temp_dir.path(), &lines);

        let prepared = prepare_index(&source, test_config(temp_dir.path())).unwrap();
        let reordered = fs::read(&prepared.manifest.reordered_file).unwrap();

        let mut occurrences: HashMap<&str, Vec<&String>> = HashMap::new();
        for (line, zip) in lines.iter().zip(["08846", "85013", "08846", "10001", "85013"]) {
            occurrences.entry(zip).or_default().push(line);
        }

        for (zip, records) in occurrences {
            let span = prepared.zip_index.get(zip).unwrap();
            let expected_len: u64 = records.iter().map(|r| r.len() as u64 + 1).sum();
            assert_eq!(span.length, expected_len);

            let bytes = &reordered[span.offset as usize..span.end() as usize];
            let text = std::str::from_utf8(bytes).unwrap();
            assert_eq!(text.matches('\n').count(), records.len());
            for line in text.lines() {
                assert!(line.contains(&format!("\"{}\"", zip)));
            }
        }

        // Equal keys keep their source order
        let span = prepared.zip_index.get("08846").unwrap();
        let text = std::str::from_utf8(&reordered[span.offset as usize..span.end() as usize]).unwrap();
        assert_eq!(text, format!("{}\n{}\n", lines[0], lines[2]));
    }

    #[test]
    fn test_small_shard_cap_produces_ordered_shards() {
        let temp_dir = tempdir().unwrap();
        let lines: Vec<String> = (0..60)
            .map(|i| record("User", &format!("{:05}", i % 7), &format!("user{:03}@example.com", (i * 37) % 60)))
            .collect();
        let source = write_source(temp_dir.path(), &lines);
        let config = IndexConfig {
            email_shard_size_bytes: 256,
            ..test_config(temp_dir.path())
        };

        let prepared = prepare_index(&source, config).unwrap();

        assert!(prepared.manifest.stats.raw_email_shards >= 2);
        assert!(prepared.manifest.email_shards.len() >= 2);
        assert_eq!(prepared.directory.len(), prepared.manifest.email_shards.len());

        let mut total = 0;
        for shard in &prepared.manifest.email_shards {
            let content = fs::read_to_string(&shard.file_path).unwrap();
            let keys: Vec<&str> = content.lines().map(|l| l.rsplitn(3, ',').last().unwrap()).collect();
            let mut sorted = keys.clone();
            sorted.sort_unstable();
            assert_eq!(keys, sorted);
            total += keys.len();
        }
        assert_eq!(total, 60);

        for pair in prepared.directory.ranges().windows(2) {
            assert!(pair[0].last_key <= pair[1].first_key);
        }
    }

    #[test]
    fn test_empty_source_prepares_empty_index() {
        let temp_dir = tempdir().unwrap();
        let source = temp_dir.path().join("empty.csv");
        fs::write(&source, "").unwrap();

        let prepared = prepare_index(&source, test_config(temp_dir.path())).unwrap();

        assert!(prepared.zip_index.is_empty());
        assert!(prepared.directory.is_empty());
        assert!(prepared.manifest.email_shards.is_empty());
        assert!(prepared.manifest.is_complete());
    }

    #[test]
    fn test_missing_source_and_bad_config() {
        let temp_dir = tempdir().unwrap();

        let result = IndexPreparer::new(&temp_dir.path().join("absent.csv"), test_config(temp_dir.path()));
        assert!(matches!(result, Err(IndexError::SourceNotFound(_))));

        let source = write_source(temp_dir.path(), &sample_lines());
        let config = IndexConfig {
            email_field_index: 7,
            ..test_config(temp_dir.path())
        };
        assert!(matches!(IndexPreparer::new(&source, config), Err(IndexError::InvalidConfig(_))));
    }

    #[test]
    fn test_stage_failure_is_typed_and_recorded() {
        let temp_dir = tempdir().unwrap();
        let source = write_source(temp_dir.path(), &sample_lines());
        let preparer = IndexPreparer::new(&source, test_config(temp_dir.path())).unwrap();

        // A directory where the zip entry file should go breaks extraction
        fs::create_dir_all(&preparer.paths().zip_entries).unwrap();
        let manifest_path = preparer.manifest_path().to_path_buf();

        let err = preparer.run().unwrap_err();
        assert_eq!(err.failed_stage(), Some(PrepareStage::Extract));

        let manifest = PrepareManifest::load(&manifest_path).unwrap();
        assert!(matches!(manifest.phase, PreparePhase::Failed(_)));
        assert!(!manifest.is_complete());
    }
}
