use anyhow::Result;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use keyspan::index::PreparePhase;
use keyspan::{prepare_index, IndexConfig, IndexError, PrepareStage, QueryEngine, Searcher};

const HEADER: &str = "first_name,last_name,company_name,address,city,county,state,zip,phone1,phone2,email,web";

/// Helper function to create a small contact list in the source format
fn create_test_data(temp_dir: &TempDir) -> Result<PathBuf> {
    let content = [
        HEADER,
        r#""James","Butt","Benton, John B Jr","6649 N Blue Gum St","New Orleans","Orleans","LA",70116,"504-621-8927","504-845-1427","jbutt@gmail.com","http://www.bentonjohnbjr.com""#,
        r#""Josephine","Darakjy","Chanay, Jeffrey A Esq","4 B Blue Ridge Blvd","Brighton","Livingston","MI",48116,"810-292-9388","810-374-9840","josephine_darakjy@darakjy.org","http://www.chanayjeffreyaesq.com""#,
        r#""Alisha","Slusarski","Wtlz Power 107 Fm","3273 State St","Middlesex","Middlesex","NJ","08846","732-658-3154","732-635-3453","alisha@slusarski.com","http://www.wtlzpowerfm.com""#,
        r#""Art","Venere","Chemel, James L Cpa","8 W Cerritos Ave #54","Bridgeport","Gloucester","NJ","08014","856-636-8749","856-264-4130","art@venere.org","http://www.chemeljameslcpa.com""#,
        "",
        r#""Lenna","Paprocki","Feltz Printing Service","639 Main St","Anchorage","Anchorage","AK",99501,"907-385-4412","907-921-2010","lpaprocki@hotmail.com","http://www.feltzprintingservice.com""#,
        r#""Donette","Foller","Printing Dimensions","34 Center St","Hamilton","Butler","OH",45011,"513-570-1893","513-549-4561","donette.foller@cox.net","http://www.printingdimensions.com""#,
        r#""Graciela","Ruta","Buckley Miller & Wright","98 Connecticut Ave Nw","Chagrin Falls","Geauga","OH",44023,"440-780-8425","440-579-7763","gruta@cox.net","http://www.buckleymillerwright.com""#,
        r#""Kiley","Caldarera","Feiner Bros","25 E 75th St #69","Los Angeles","Los Angeles","CA",90034,"310-498-5651","310-254-3084","kiley.caldarera@aol.com","http://www.feinerbros.com""#,
        r#""Mitsue","Tollner","Morlong Associates","7 Eads St","Chicago","Cook","IL",60632,"773-573-6914","773-924-8565","mitsue_tollner@yahoo.com","http://www.morlongassociates.com""#,
        r#""Ezekiel","Chui","Sider, Donald C Esq","2 Cedar Ave #84","Easton","Talbot","MD",21601,"410-669-1642","410-235-8738","ezekiel@chui.com","http://www.siderdonaldcesq.com""#,
        r#""Shenika","Seewald","East Coast Marketing","4 Otis St","Van Nuys","Los Angeles","CA",91405,"818-423-4007","818-749-8650","shenika@gmail.com","http://www.eastcoastmarketing.com""#,
        r#""Marjory","Mastella","Vicon Corporation","71 San Mateo Ave","Wayne","Delaware","PA",19087,"610-814-5533","610-379-7125","mmastella@mastella.com","http://www.viconcorporation.com""#,
        r#""Jose","Stockham","Tri State Refueler Co","128 Bransten Rd","New York","New York","NY","08846","212-675-8570","212-569-4233","jose@yahoo.com","http://www.tristaterefuelerco.com""#,
        "too,short,a,line",
    ]
    .join("\r\n");

    let source = temp_dir.path().join("us-500.csv");
    fs::write(&source, content)?;
    Ok(source)
}

fn create_test_config(temp_dir: &TempDir, shard_size: u64) -> IndexConfig {
    IndexConfig {
        work_directory: Some(temp_dir.path().join("index")),
        email_shard_size_bytes: shard_size,
        processing_threads: 2,
        ..Default::default()
    }
}

fn source_line(source: &Path, needle: &str) -> Result<String> {
    let content = fs::read_to_string(source)?;
    content
        .lines()
        .find(|l| l.contains(needle))
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("{} not in source", needle))
}

#[test]
fn test_zip_lookup_returns_every_record() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let source = create_test_data(&temp_dir)?;
    let prepared = prepare_index(&source, create_test_config(&temp_dir, 1 << 20))?;
    let config = create_test_config(&temp_dir, 1 << 20);
    let engine = QueryEngine::from_prepared(prepared, &config)?;

    let result = engine.lookup_by_zip("08846")?;
    assert_eq!(result.record_count, 2);
    let alisha = source_line(&source, "alisha@slusarski.com")?;
    let jose = source_line(&source, "jose@yahoo.com")?;
    assert_eq!(result.result, format!("{}\n{}\n", alisha, jose));

    // Quoted and unquoted zip fields resolve to the same key form
    assert_eq!(engine.lookup_by_zip("70116")?.record_count, 1);
    assert_eq!(engine.lookup_by_zip("zip")?.record_count, 1);

    Ok(())
}

#[test]
fn test_email_lookup_round_trip() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let source = create_test_data(&temp_dir)?;
    let config = create_test_config(&temp_dir, 1 << 20);
    let engine = QueryEngine::from_prepared(prepare_index(&source, config.clone())?, &config)?;

    let result = engine.lookup_by_email("mitsue_tollner@yahoo.com")?;
    assert_eq!(result.result, source_line(&source, "mitsue_tollner@yahoo.com")?);
    assert_eq!(result.record_count, 1);

    let missing = engine.lookup_by_email("no@such.email")?;
    assert_eq!((missing.result.as_str(), missing.record_count), ("", 0));

    Ok(())
}

#[test]
fn test_small_shard_cap_and_reopen() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let source = create_test_data(&temp_dir)?;
    let config = create_test_config(&temp_dir, 128);

    let prepared = prepare_index(&source, config.clone())?;
    assert!(prepared.manifest.email_shards.len() >= 2);
    for pair in prepared.directory.ranges().windows(2) {
        assert!(pair[0].last_key <= pair[1].first_key);
    }

    let manifest_path = prepared.manifest_path.clone();
    let engine = QueryEngine::open(&manifest_path, &config)?;
    assert_eq!(engine.directory(), &prepared.directory);

    for email in ["jbutt@gmail.com", "gruta@cox.net", "shenika@gmail.com", "ezekiel@chui.com"] {
        let result = engine.lookup_by_email(email)?;
        assert_eq!(result.result, source_line(&source, email)?);
        assert_eq!(result.record_count, 1);
    }

    Ok(())
}

#[test]
fn test_reordered_file_keeps_every_record() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let source = create_test_data(&temp_dir)?;
    let prepared = prepare_index(&source, create_test_config(&temp_dir, 1 << 20))?;

    assert_eq!(prepared.manifest.stats.lines_read, 16);
    assert_eq!(prepared.manifest.stats.records_indexed, 14);
    assert_eq!(prepared.manifest.stats.lines_skipped, 2);

    let source_text = fs::read_to_string(&source)?;
    let expected: HashSet<&str> = source_text.lines().filter(|l| l.split(',').count() >= 12).collect();
    let reordered = fs::read_to_string(&prepared.manifest.reordered_file)?;
    let actual: Vec<&str> = reordered.lines().collect();

    assert_eq!(actual.len(), 14);
    assert_eq!(actual.iter().copied().collect::<HashSet<_>>(), expected);

    Ok(())
}

#[test]
fn test_oversized_zip_result_is_empty() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let source = create_test_data(&temp_dir)?;
    let prepared = prepare_index(&source, create_test_config(&temp_dir, 1 << 20))?;

    let config = IndexConfig {
        mmap_chunk_size_bytes: 300,
        ..create_test_config(&temp_dir, 1 << 20)
    };
    let engine = QueryEngine::from_prepared(prepared, &config)?;

    assert!(engine.lookup_by_zip("08846")?.is_empty());
    assert_eq!(engine.lookup_by_zip("70116")?.record_count, 1);

    Ok(())
}

#[test]
fn test_searcher_lifecycle() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let source = create_test_data(&temp_dir)?;
    let mut searcher = Searcher::new(&source, create_test_config(&temp_dir, 1 << 20));

    assert!(matches!(searcher.search_by_zip("08846"), Err(IndexError::NotReady(_))));

    let stats = searcher.prepare()?;
    assert_eq!(stats.distinct_zip_codes, 13);
    assert_eq!(searcher.search_by_zip("08846")?.record_count, 2);
    assert_eq!(searcher.search_by_email("")?.record_count, 0);

    Ok(())
}

#[test]
fn test_missing_source_is_reported() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let result = prepare_index(&temp_dir.path().join("absent.csv"), create_test_config(&temp_dir, 1 << 20));

    match result {
        Err(IndexError::SourceNotFound(path)) => assert!(path.ends_with("absent.csv")),
        other => panic!("expected SourceNotFound, got {:?}", other.map(|p| p.manifest_path)),
    }
    Ok(())
}

#[test]
fn test_failed_stage_is_named() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let source = create_test_data(&temp_dir)?;
    let config = create_test_config(&temp_dir, 1 << 20);
    let preparer = keyspan::IndexPreparer::new(&source, config.clone())?;

    // Block the reordered file so the reorder stage cannot create it
    fs::create_dir_all(&preparer.paths().reordered)?;
    let manifest_path = preparer.manifest_path().to_path_buf();

    let err = preparer.run().unwrap_err();
    assert_eq!(err.failed_stage(), Some(PrepareStage::Reorder));
    assert!(err.to_string().contains("reorder"));

    let manifest = keyspan::index::PrepareManifest::load(&manifest_path)?;
    assert!(matches!(manifest.phase, PreparePhase::Failed(_)));
    assert!(matches!(QueryEngine::open(&manifest_path, &config), Err(IndexError::NotReady(_))));

    Ok(())
}
