//! # Integration Tests for RhythmDB
//!
//! These tests drive the public API end to end: staging and committing
//! entries, running queries against the store, and watching live query
//! models (including chained ones) follow committed changes.

use anyhow::Result;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rhythmdb::model::{
    ModelEvent, ModelOptions, ModelPhase, ModelSource, QueryModel, SortKey, SortOrder,
};
use rhythmdb::config::DbConfig;
use rhythmdb::{DbError, EntryId, PropKey, Query, QueryTerm, RhythmDb, Value};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Stages a song with the given title and artist. The caller commits.
fn stage_song(db: &RhythmDb, location: &str, title: &str, artist: &str) -> Result<EntryId> {
    let song = db.entry_type("song").expect("song is built in");
    let id = db.create_entry(&song, location)?;
    db.set_property(id, PropKey::Title, title)?;
    db.set_property(id, PropKey::Artist, artist)?;
    Ok(id)
}

/// Records the names of every event a model emits.
fn record_events(model: &QueryModel) -> Arc<Mutex<Vec<&'static str>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    model.subscribe(move |event: &ModelEvent| sink.lock().push(event.name()));
    log
}

#[cfg(test)]
mod query_tests {
    use super::*;

    fn nin_database() -> Result<(RhythmDb, EntryId)> {
        let db = RhythmDb::new();
        let ignore = db.entry_type("ignore").expect("ignore is built in");
        let id = db.create_entry(&ignore, "file:///whee.ogg")?;
        db.set_property(id, PropKey::Genre, "Rock")?;
        db.set_property(id, PropKey::Artist, "Nine Inch Nails")?;
        db.set_property(id, PropKey::Album, "Pretty Hate Machine")?;
        db.set_property(id, PropKey::Title, "Sin")?;
        db.commit();
        Ok((db, id))
    }

    fn matches(db: &RhythmDb, terms: Vec<QueryTerm>) -> bool {
        let query = Query::parse(terms).expect("query parses");
        !db.search(&query).is_empty()
    }

    #[test]
    fn test_committed_entry_is_searchable() -> Result<()> {
        init_logging();
        let (db, _) = nin_database()?;
        let ignore = db.entry_type("ignore").unwrap();

        assert!(matches(&db, vec![
            QueryTerm::equals(PropKey::Type, ignore.clone()),
            QueryTerm::equals(PropKey::Title, "Sin"),
            QueryTerm::End,
        ]));
        assert!(!matches(&db, vec![
            QueryTerm::equals(PropKey::Type, ignore),
            QueryTerm::like(PropKey::Artist, "Nine Inch"),
            QueryTerm::like(PropKey::Album, "Load"),
        ]));
        assert!(matches(&db, vec![QueryTerm::like(PropKey::SearchMatch, "Pretty Nine")]));
        Ok(())
    }

    #[test]
    fn test_disjunction_regression() -> Result<()> {
        let (db, _) = nin_database()?;
        let either = |a: &str, b: &str| {
            vec![
                QueryTerm::like(PropKey::Title, a),
                QueryTerm::Disjunction,
                QueryTerm::like(PropKey::Title, b),
                QueryTerm::End,
            ]
        };

        assert!(matches(&db, either("Sin", "Son")));
        assert!(matches(&db, either("Sun", "Sin")));
        assert!(!matches(&db, either("Sun", "Son")));
        Ok(())
    }

    #[test]
    fn test_preprocess_does_not_change_results() -> Result<()> {
        let (db, id) = nin_database()?;
        let entry = db.entry(id).expect("committed");

        for needle in ["pretty nine", "HATE", "rock sin", "ministry", ""] {
            let raw = Query::parse([QueryTerm::like(PropKey::SearchMatch, needle)])?;
            let mut prepared = raw.clone();
            prepared.preprocess();
            prepared.preprocess();
            assert_eq!(prepared.evaluate(&entry), raw.evaluate(&entry), "needle {needle:?}");
        }
        Ok(())
    }

    #[test]
    fn test_saved_json_query_resolves_against_database() -> Result<()> {
        let (db, id) = nin_database()?;
        let json = r#"[
            {"term": "prop", "op": "equals", "prop": "type", "value": "ignore"},
            {"term": "prop", "op": "prefix", "prop": "album", "value": "pretty"},
            {"term": "disjunction"},
            {"term": "range", "prop": "play-count", "low": 10, "high": 20}
        ]"#;

        let query = db.query_from_json(json)?;
        let found = db.search(&query);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), id);

        let bad = db.query_from_json(r#"[{"term": "disjunction"}]"#);
        assert!(matches!(bad, Err(DbError::MalformedQuery(_))));
        Ok(())
    }

    #[test]
    fn test_staged_changes_are_not_searchable() -> Result<()> {
        let (db, id) = nin_database()?;
        db.set_property(id, PropKey::Title, "Son")?;

        let sin = Query::parse([QueryTerm::equals(PropKey::Title, "Sin")])?;
        assert_eq!(db.search(&sin).len(), 1, "old value until commit");

        db.commit();
        assert!(db.search(&sin).is_empty());
        Ok(())
    }
}

#[cfg(test)]
mod store_tests {
    use super::*;

    #[test]
    fn test_duplicate_create_leaves_count_unchanged() -> Result<()> {
        let db = RhythmDb::new();
        stage_song(&db, "file:///a.ogg", "A", "X")?;
        db.commit();
        assert_eq!(db.entry_count(), 1);

        let song = db.entry_type("song").unwrap();
        let duplicate = db.create_entry(&song, "file:///a.ogg");
        assert!(matches!(duplicate, Err(DbError::DuplicateEntry { .. })));

        db.commit();
        assert_eq!(db.entry_count(), 1);
        Ok(())
    }

    #[test]
    fn test_lookup_by_location_and_type_listing() -> Result<()> {
        let db = RhythmDb::new();
        let song = db.entry_type("song").unwrap();
        let ignore = db.entry_type("ignore").unwrap();
        let a = stage_song(&db, "file:///a.ogg", "A", "X")?;
        db.create_entry(&ignore, "file:///cover.jpg")?;

        assert_eq!(db.lookup(&song, "file:///a.ogg"), Some(a), "staged entries are found");
        db.commit();

        assert_eq!(db.entries_of_type(&song).len(), 1);
        assert_eq!(db.entries_of_type(&ignore).len(), 1);
        assert_eq!(db.lookup(&ignore, "file:///a.ogg"), None);
        Ok(())
    }

    #[test]
    fn test_commit_summary_counts() -> Result<()> {
        let db = RhythmDb::new();
        let a = stage_song(&db, "file:///a.ogg", "A", "X")?;
        let b = stage_song(&db, "file:///b.ogg", "B", "X")?;
        let summary = db.commit();
        assert_eq!(summary.added, 2);

        let c = stage_song(&db, "file:///c.ogg", "C", "X")?;
        db.delete_entry(c)?;
        db.set_property(a, PropKey::Rating, 5.0)?;
        db.delete_entry(b)?;
        let summary = db.commit();

        assert_eq!(summary.added, 0);
        assert_eq!(summary.changed, 1);
        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.discarded, 1);
        Ok(())
    }
}

#[cfg(test)]
mod model_tests {
    use super::*;

    #[test]
    fn test_hidden_flag_propagates_through_chain() -> Result<()> {
        init_logging();
        let db = RhythmDb::new();
        let id = stage_song(&db, "file:///whee.ogg", "Sin", "Nine Inch Nails")?;
        db.commit();

        let base = QueryModel::new(
            &db,
            ModelSource::Manual,
            ModelOptions::new().with_show_hidden(true),
        );
        let filter = QueryModel::new_chained(&base, ModelOptions::new());

        let inserted = Arc::new(AtomicUsize::new(0));
        let deleted = Arc::new(AtomicUsize::new(0));
        {
            let inserted = Arc::clone(&inserted);
            let deleted = Arc::clone(&deleted);
            filter.subscribe(move |event: &ModelEvent| match event {
                ModelEvent::RowInserted { .. } => {
                    inserted.fetch_add(1, Ordering::SeqCst);
                }
                ModelEvent::RowDeleted { .. } => {
                    deleted.fetch_add(1, Ordering::SeqCst);
                }
                _ => {}
            });
        }

        base.add_entry(id, None);
        assert!(base.contains(id));
        assert!(filter.contains(id));
        assert_eq!(inserted.load(Ordering::SeqCst), 1);
        assert_eq!(deleted.load(Ordering::SeqCst), 0);

        db.set_property(id, PropKey::Hidden, true)?;
        db.commit();
        assert!(base.contains(id), "base shows hidden entries");
        assert!(!filter.contains(id), "filter hides them");
        assert_eq!(inserted.load(Ordering::SeqCst), 1);
        assert_eq!(deleted.load(Ordering::SeqCst), 1);

        db.set_property(id, PropKey::Hidden, false)?;
        db.commit();
        assert!(base.contains(id));
        assert!(filter.contains(id));
        assert_eq!(inserted.load(Ordering::SeqCst), 2);
        assert_eq!(deleted.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn test_add_entry_twice_is_a_no_op() -> Result<()> {
        let db = RhythmDb::new();
        let id = stage_song(&db, "file:///a.ogg", "A", "X")?;
        db.commit();

        let manual = QueryModel::new_empty(&db);
        assert_eq!(manual.phase(), ModelPhase::Empty);
        manual.add_entry(id, None);
        manual.add_entry(id, None);
        assert_eq!(manual.count(), 1);
        assert_eq!(manual.phase(), ModelPhase::Populated);

        let library = QueryModel::new(&db, ModelSource::Store, ModelOptions::new());
        library.add_entry(id, None);
        assert_eq!(library.count(), 1);
        Ok(())
    }

    #[test]
    fn test_sorted_model_moves_changed_rows() -> Result<()> {
        let db = RhythmDb::new();
        let charlie = stage_song(&db, "file:///c.ogg", "Charlie", "X")?;
        let alpha = stage_song(&db, "file:///a.ogg", "alpha", "X")?;
        let bravo = stage_song(&db, "file:///b.ogg", "Bravo", "X")?;
        db.commit();

        let model = QueryModel::new(
            &db,
            ModelSource::Store,
            ModelOptions::new().with_sort(SortOrder::ascending(SortKey::Title)),
        );
        assert_eq!(model.entry_ids(), vec![alpha, bravo, charlie], "case-insensitive order");
        let events = record_events(&model);

        db.set_property(alpha, PropKey::Title, "Zulu")?;
        db.commit();
        assert_eq!(*events.lock(), vec!["row-moved", "row-changed"]);
        assert_eq!(model.entry_to_position(alpha), Some(2));
        assert_eq!(model.position_to_entry(0).map(|entry| entry.id()), Some(bravo));

        events.lock().clear();
        db.set_property(bravo, PropKey::PlayCount, 7u64)?;
        db.commit();
        assert_eq!(*events.lock(), vec!["row-changed"], "unrelated keys skip re-evaluation");
        assert_eq!(model.entry_to_position(bravo), Some(0));
        Ok(())
    }

    #[test]
    fn test_rebuild_order_is_deterministic() -> Result<()> {
        let db = RhythmDb::new();
        for index in 0..30 {
            let title = ["same", "other", "same"][index % 3];
            stage_song(&db, &format!("file:///{index}.ogg"), title, "X")?;
        }
        db.commit();

        let options = ModelOptions::new().with_sort(SortOrder::ascending(SortKey::Title));
        let first = QueryModel::new(&db, ModelSource::Store, options.clone());
        let second = QueryModel::new(&db, ModelSource::Store, options);
        let order = first.entry_ids();

        assert_eq!(second.entry_ids(), order);
        first.rebuild();
        assert_eq!(first.entry_ids(), order);

        let same = first
            .entries()
            .into_iter()
            .filter(|entry| entry.title() == "same")
            .map(|entry| entry.id())
            .collect::<Vec<_>>();
        assert!(same.windows(2).all(|pair| pair[0] < pair[1]), "ties broken by identity");
        Ok(())
    }

    #[test]
    fn test_descending_sort_keeps_identity_tie_break() -> Result<()> {
        let db = RhythmDb::new();
        let a1 = stage_song(&db, "file:///1.ogg", "a", "X")?;
        let b = stage_song(&db, "file:///2.ogg", "b", "X")?;
        let a2 = stage_song(&db, "file:///3.ogg", "a", "X")?;
        db.commit();

        let model = QueryModel::new(
            &db,
            ModelSource::Store,
            ModelOptions::new().with_sort(SortOrder::descending(SortKey::Title)),
        );
        assert_eq!(model.entry_ids(), vec![b, a1, a2]);
        Ok(())
    }

    #[test]
    fn test_unsorted_chained_model_follows_parent_order() -> Result<()> {
        let db = RhythmDb::new();
        let echo = stage_song(&db, "file:///1.ogg", "Echo", "X")?;
        let alpha = stage_song(&db, "file:///2.ogg", "Alpha", "X")?;
        let bravo = stage_song(&db, "file:///3.ogg", "Bravo", "X")?;
        stage_song(&db, "file:///4.ogg", "Delta", "X")?;
        db.commit();

        let parent = QueryModel::new(
            &db,
            ModelSource::Store,
            ModelOptions::new().with_sort(SortOrder::ascending(SortKey::Title)),
        );
        let child = QueryModel::new_chained(
            &parent,
            ModelOptions::new().with_query(Query::parse([QueryTerm::like(PropKey::Title, "o")])?),
        );
        assert_eq!(child.entry_ids(), vec![bravo, echo]);

        db.set_property(alpha, PropKey::Title, "Foxtrot")?;
        db.commit();
        assert_eq!(child.entry_ids(), vec![bravo, echo, alpha]);

        let events = record_events(&child);
        db.set_property(echo, PropKey::Title, "Aorta")?;
        db.commit();
        assert_eq!(child.entry_ids(), vec![echo, bravo, alpha]);
        assert_eq!(*events.lock(), vec!["row-moved", "row-changed"]);
        Ok(())
    }

    #[test]
    fn test_deleted_entries_leave_every_model() -> Result<()> {
        let db = RhythmDb::new();
        let keep = stage_song(&db, "file:///a.ogg", "Keep", "X")?;
        let gone = stage_song(&db, "file:///b.ogg", "Gone", "X")?;
        db.commit();

        let library = QueryModel::new(&db, ModelSource::Store, ModelOptions::new());
        let chained = QueryModel::new_chained(&library, ModelOptions::new());
        let manual = QueryModel::new_empty(&db);
        manual.add_entry(gone, None);
        assert_eq!(chained.count(), 2);

        db.delete_entry(gone)?;
        assert!(library.contains(gone), "deletion is staged only");
        db.commit();

        assert_eq!(library.entry_ids(), vec![keep]);
        assert_eq!(chained.entry_ids(), vec![keep]);
        assert_eq!(manual.count(), 0);
        Ok(())
    }

    #[test]
    fn test_set_query_recomputes_membership() -> Result<()> {
        let db = RhythmDb::new();
        let nin = stage_song(&db, "file:///a.ogg", "Sin", "Nine Inch Nails")?;
        stage_song(&db, "file:///b.ogg", "Stigmata", "Ministry")?;
        db.commit();

        let model = QueryModel::new(&db, ModelSource::Store, ModelOptions::new());
        assert_eq!(model.count(), 2);
        let events = record_events(&model);

        model.set_query(Some(Query::parse([QueryTerm::like(PropKey::Artist, "nine")])?));
        assert_eq!(model.entry_ids(), vec![nin]);
        assert_eq!(*events.lock(), vec!["row-deleted"]);

        model.set_query(None);
        assert_eq!(model.count(), 2);
        assert!(model.query().is_none());
        Ok(())
    }

    #[test]
    fn test_manual_model_restores_rejected_members() -> Result<()> {
        let db = RhythmDb::new();
        let id = stage_song(&db, "file:///a.ogg", "Son", "X")?;
        db.commit();

        let model = QueryModel::new(
            &db,
            ModelSource::Manual,
            ModelOptions::new()
                .with_query(Query::parse([QueryTerm::equals(PropKey::Title, "Sin")])?),
        );
        model.add_entry(id, None);
        assert_eq!(model.count(), 0);

        db.set_property(id, PropKey::Title, "Sin")?;
        db.commit();
        assert!(model.contains(id));

        model.remove_entry(id);
        db.set_property(id, PropKey::Title, "Son")?;
        db.commit();
        db.set_property(id, PropKey::Title, "Sin")?;
        db.commit();
        assert!(!model.contains(id), "removed members are forgotten");
        Ok(())
    }

    #[test]
    fn test_show_hidden_toggle() -> Result<()> {
        let db = RhythmDb::new();
        let id = stage_song(&db, "file:///a.ogg", "A", "X")?;
        db.set_property(id, PropKey::Hidden, true)?;
        db.commit();

        let model = QueryModel::new(&db, ModelSource::Store, ModelOptions::new());
        assert_eq!(model.count(), 0);
        model.set_show_hidden(true);
        assert!(model.contains(id));
        assert!(model.show_hidden());
        Ok(())
    }

    #[test]
    fn test_unsorted_manual_model_honours_position() -> Result<()> {
        let db = RhythmDb::new();
        let a = stage_song(&db, "file:///a.ogg", "A", "X")?;
        let b = stage_song(&db, "file:///b.ogg", "B", "X")?;
        let c = stage_song(&db, "file:///c.ogg", "C", "X")?;
        db.commit();

        let model = QueryModel::new_empty(&db);
        model.add_entry(a, None);
        model.add_entry(b, None);
        model.add_entry(c, Some(0));
        assert_eq!(model.entry_ids(), vec![c, a, b]);

        model.rebuild();
        assert_eq!(model.entry_ids(), vec![c, a, b], "rebuild keeps playlist order");
        Ok(())
    }

    #[test]
    fn test_parallel_rebuild_matches_sequential() -> Result<()> {
        let build = |parallel_threshold: usize| -> Result<Arc<QueryModel>> {
            let db = RhythmDb::with_config(DbConfig {
                parallel_threshold,
                ..DbConfig::default()
            });
            for index in 0..200u64 {
                let title = ["same", "alpha", "zulu", "mid"][(index % 4) as usize];
                let artist = if index % 3 == 0 { "Ministry" } else { "Nine Inch Nails" };
                let id = stage_song(&db, &format!("file:///{index}.ogg"), title, artist)?;
                db.set_property(id, PropKey::Hidden, index % 7 == 0)?;
            }
            db.commit();
            Ok(QueryModel::new(
                &db,
                ModelSource::Store,
                ModelOptions::new()
                    .with_query(Query::parse([QueryTerm::like(PropKey::Artist, "nine")])?)
                    .with_sort(SortOrder::ascending(SortKey::Title)),
            ))
        };

        let parallel = build(1)?;
        let sequential = build(usize::MAX)?;
        assert!(parallel.count() > 0);
        assert_eq!(parallel.entry_ids(), sequential.entry_ids());

        parallel.set_show_hidden(true);
        sequential.set_show_hidden(true);
        assert_eq!(parallel.entry_ids(), sequential.entry_ids());
        Ok(())
    }
}

#[cfg(test)]
mod chained_model_tests {
    use super::*;

    fn set_stats(db: &RhythmDb, id: EntryId, genre: &str, plays: u64) -> Result<()> {
        db.set_property(id, PropKey::Genre, genre)?;
        db.set_property(id, PropKey::PlayCount, plays)?;
        Ok(())
    }

    #[test]
    fn test_changes_propagate_through_two_levels() -> Result<()> {
        init_logging();
        let db = RhythmDb::new();
        let a = stage_song(&db, "file:///a.ogg", "Alpha", "X")?;
        let b = stage_song(&db, "file:///b.ogg", "Bravo", "X")?;
        let c = stage_song(&db, "file:///c.ogg", "Charlie", "X")?;
        set_stats(&db, a, "Rock", 20)?;
        set_stats(&db, b, "Rock", 5)?;
        set_stats(&db, c, "Jazz", 30)?;
        db.commit();

        let library = QueryModel::new(
            &db,
            ModelSource::Store,
            ModelOptions::new().with_sort(SortOrder::ascending(SortKey::Title)),
        );
        let rock = QueryModel::new_chained(
            &library,
            ModelOptions::new()
                .with_query(Query::parse([QueryTerm::equals(PropKey::Genre, "Rock")])?),
        );
        let loud = QueryModel::new_chained(
            &rock,
            ModelOptions::new()
                .with_query(Query::parse([QueryTerm::greater(PropKey::PlayCount, 10u64)])?),
        );
        assert_eq!(rock.entry_ids(), vec![a, b]);
        assert_eq!(loud.entry_ids(), vec![a]);

        let d = stage_song(&db, "file:///d.ogg", "Delta", "X")?;
        set_stats(&db, d, "Rock", 50)?;
        db.commit();
        assert_eq!(loud.entry_ids(), vec![a, d]);

        db.set_property(d, PropKey::Hidden, true)?;
        db.commit();
        assert!(!library.contains(d));
        assert!(!rock.contains(d));
        assert!(!loud.contains(d));

        db.set_property(d, PropKey::Hidden, false)?;
        db.set_property(b, PropKey::PlayCount, 15u64)?;
        db.commit();
        assert_eq!(loud.entry_ids(), vec![a, b, d], "follows the grandparent's order");

        db.delete_entry(a)?;
        db.commit();
        assert_eq!(rock.entry_ids(), vec![b, d]);
        assert_eq!(loud.entry_ids(), vec![b, d]);
        Ok(())
    }

    #[test]
    fn test_unsorted_child_follows_parent_resort() -> Result<()> {
        let db = RhythmDb::new();
        let mut ids = Vec::new();
        for title in ["Alpha", "Bravo", "Charlie", "Delta", "Echo", "Foxtrot"] {
            ids.push(stage_song(&db, &format!("file:///{title}.ogg"), title, "X")?);
        }
        db.commit();
        let (bravo, echo, foxtrot) = (ids[1], ids[4], ids[5]);

        let parent = QueryModel::new(&db, ModelSource::Store, ModelOptions::new());
        let child = QueryModel::new_chained(
            &parent,
            ModelOptions::new().with_query(Query::parse([QueryTerm::like(PropKey::Title, "o")])?),
        );
        let grandchild = QueryModel::new_chained(&child, ModelOptions::new());
        assert_eq!(child.entry_ids(), vec![bravo, echo, foxtrot]);

        parent.set_sort(Some(SortOrder::descending(SortKey::Title)));
        assert_eq!(child.entry_ids(), vec![foxtrot, echo, bravo]);
        assert_eq!(grandchild.entry_ids(), child.entry_ids());

        parent.set_sort(None);
        assert_eq!(child.entry_ids(), vec![bravo, echo, foxtrot]);
        assert_eq!(grandchild.entry_ids(), child.entry_ids());
        Ok(())
    }
}

#[cfg(test)]
mod worker_tests {
    use super::*;
    use rhythmdb::worker::CommitWorker;
    use std::thread;

    #[test]
    fn test_producers_stage_while_worker_commits() -> Result<()> {
        init_logging();
        let db = RhythmDb::with_config(DbConfig {
            commit_interval_ms: 60_000,
            ..DbConfig::default()
        });
        let worker = CommitWorker::spawn(db.clone())?;
        let library = QueryModel::new(
            &db,
            ModelSource::Store,
            ModelOptions::new().with_sort(SortOrder::ascending(SortKey::Location)),
        );

        let producers = (0..4)
            .map(|thread_index| {
                let db = db.clone();
                thread::spawn(move || -> rhythmdb::Result<()> {
                    let song = db.entry_type("song").expect("song is built in");
                    for index in 0..25 {
                        let location = format!("file:///{thread_index}/{index}.ogg");
                        let id = db.create_entry(&song, location)?;
                        db.set_property(id, PropKey::PlayCount, index as u64)?;
                    }
                    Ok(())
                })
            })
            .collect::<Vec<_>>();
        for producer in producers {
            producer.join().expect("producer thread")?;
        }

        worker.flush();
        assert_eq!(library.count(), 100);
        assert_eq!(
            library.position_to_entry(0).map(|entry| entry.location().to_string()),
            Some("file:///0/0.ogg".to_string())
        );
        worker.shutdown();
        Ok(())
    }

    #[test]
    fn test_bulk_operation_reports_progress() -> Result<()> {
        let db = RhythmDb::new();
        let import = db.begin_bulk("Importing", Some(3));
        for index in 0..3 {
            stage_song(&db, &format!("file:///{index}.ogg"), "t", "a")?;
            import.advance(1);
        }
        let progress = db.progress();
        assert_eq!(progress.text, "Importing");
        assert!((progress.fraction - 1.0).abs() < f64::EPSILON);

        drop(import);
        assert!(db.is_busy(), "staged work keeps the database busy");
        db.commit();
        assert!(!db.is_busy());
        Ok(())
    }
}

#[cfg(test)]
mod configuration_tests {
    use super::*;
    use rhythmdb::EntryTypeDef;
    use tempfile::TempDir;

    #[test]
    fn test_config_file_controls_builtin_types() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{ "register_builtin_types": false }"#)?;

        let db = RhythmDb::with_config(DbConfig::load(Some(&path))?);
        assert!(db.entry_type("song").is_none());
        assert!(db.entry_types().is_empty());

        let radio = db.register_type(EntryTypeDef::new("iradio-station"))?;
        let id = db.create_entry(&radio, "http://example.com/stream")?;
        db.commit();
        assert_eq!(db.get_property(id, PropKey::Artist)?, Value::from(""));
        Ok(())
    }

    #[test]
    fn test_type_conflict_is_reported() -> Result<()> {
        let db = RhythmDb::new();
        let conflicting = EntryTypeDef::new("song").with_property(PropKey::PostTime);
        assert!(matches!(db.register_type(conflicting), Err(DbError::TypeConflict(_))));
        assert!(db.register_type(EntryTypeDef::song()).is_ok());
        Ok(())
    }
}
