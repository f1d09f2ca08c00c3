use ms1ft::clustering::ClusterFinder;
use ms1ft::matrix::{
    ChargeRange,
    FeatureCell,
    FeatureMatrix,
    MassQuery,
};
use ms1ft::utils::ion::isotope_mz;
use ms1ft::{
    read_feature_table,
    Averagine,
    FeatureCluster,
    FeatureFinder,
    FeatureFinderConfig,
    FeatureFindingError,
    FeatureMs2Map,
    FeatureParquetWriter,
    FeatureRecord,
    FeatureTsvWriter,
    IsotopeList,
    ScoreKind,
};
use ms1query::{
    InMemoryRun,
    IsolationWindow,
    Peak,
    PeakIndex,
    Spectrum,
    SpectrumSource,
    Tolerance,
};
use rand::{
    Rng,
    SeedableRng,
};
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use std::sync::atomic::{
    AtomicBool,
    Ordering,
};
use std::sync::Arc;

const NUM_COLUMNS: u32 = 21;
const MASS: f64 = 10_000.0;
const CHARGE: u32 = 5;

fn isotopes(mass: f64) -> IsotopeList {
    IsotopeList::build(mass, &Averagine::new(), 30, 0.1).unwrap()
}

fn elution(col: u32, apex: f64, width: f64) -> f64 {
    let x = col as f64 - apex;
    (-x * x / (2.0 * width * width)).exp()
}

/// Like [elution] but cut to zero further than three widths from the apex.
fn pulse(col: u32, apex: f64, width: f64) -> f64 {
    if (col as f64 - apex).abs() > 3.0 * width {
        0.0
    } else {
        elution(col, apex, width)
    }
}

/// Isotope envelope of `mass` at `charge`, scaled by `height`.
/// Only the isotopes accepted by `keep(slot_rank)` are emitted.
fn envelope_peaks(
    mass: f64,
    charge: u32,
    height: f64,
    keep: impl Fn(usize) -> bool,
) -> Vec<Peak> {
    if height <= 0.0 {
        return Vec::new();
    }
    let isotopes = isotopes(mass);
    let ranks = isotopes.sorted_index_by_intensity();
    isotopes
        .entries()
        .iter()
        .enumerate()
        .filter(|(slot, _)| {
            let rank = ranks.iter().position(|s| s == slot).unwrap();
            keep(rank)
        })
        .map(|(_, e)| Peak::new(isotope_mz(mass, charge, e.index), e.ratio * height))
        .collect()
}

/// MS1 scans are numbered `100 + 2 * col`. With `with_ms2`, every MS1 scan is
/// followed by an MS2 scan isolating the most abundant isotope of the envelope.
fn scenario_run(peaks_at: impl Fn(u32) -> Vec<Peak>, with_ms2: bool) -> InMemoryRun {
    let top_mz = isotope_mz(MASS, CHARGE, isotopes(MASS).most_abundant().index);
    let mut spectra = Vec::new();
    for col in 0..NUM_COLUMNS {
        let mut peaks = peaks_at(col);
        peaks.sort_by(|a, b| a.cmp_mz(b));
        spectra.push(Spectrum::new_ms1(100 + 2 * col, peaks));
        if with_ms2 {
            spectra.push(Spectrum::new_ms2(
                101 + 2 * col,
                IsolationWindow {
                    target_mz: top_mz,
                    lower_offset: 1.5,
                    upper_offset: 1.5,
                },
                vec![Peak::new(300.0, 10.0)],
            ));
        }
    }
    InMemoryRun::from_spectra(spectra).unwrap()
}

/// Envelope of [MASS] at [CHARGE] with even isotopes raised by `skew` and
/// odd ones lowered by it.
fn skewed_peaks(height: f64, skew: f64) -> Vec<Peak> {
    isotopes(MASS)
        .entries()
        .iter()
        .map(|e| {
            let sign = if e.index % 2 == 0 { 1.0 } else { -1.0 };
            Peak::new(
                isotope_mz(MASS, CHARGE, e.index),
                e.ratio * height * (1.0 + sign * skew),
            )
        })
        .collect()
}

/// A three scan elution at columns 9..=11. The apex and the shoulders are
/// skewed in opposite directions so that each shoulder brings the summed
/// envelope closer to the theoretical one.
fn clean_run(with_ms2: bool) -> InMemoryRun {
    scenario_run(
        |col| match col {
            10 => skewed_peaks(1e6, 0.05),
            9 | 11 => skewed_peaks(4e5, -0.0625),
            _ => Vec::new(),
        },
        with_ms2,
    )
}

fn noise_peaks(rng: &mut ChaCha8Rng, num_peaks: usize) -> Vec<Peak> {
    (0..num_peaks)
        .map(|_| Peak::new(rng.gen_range(400.0..2500.0), rng.gen_range(1e3..1e5)))
        .collect()
}

fn sweep_config(max_threads: usize) -> FeatureFinderConfig {
    FeatureFinderConfig {
        min_mass: 9990.0,
        max_mass: 10010.0,
        // One chunk, so every bin is scored before any peak gets claimed.
        chunk_size: 4096,
        max_threads,
        ..Default::default()
    }
}

fn sweep(run: &InMemoryRun, config: FeatureFinderConfig) -> Vec<FeatureCluster> {
    let finder = FeatureFinder::new(run, config).unwrap();
    let mut features: Vec<FeatureCluster> = Vec::new();
    let summary = finder.extract_features(&mut features).unwrap();
    assert_eq!(summary.features_written, features.len());
    assert_eq!(summary.failed_bins, 0);
    features
}

fn temp_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("ms1ft_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_clean_envelope_is_found() {
    let run = clean_run(false);
    let finder = FeatureFinder::new(&run, FeatureFinderConfig::default()).unwrap();
    let features = finder.get_all_features(MASS).unwrap();
    assert_eq!(features.len(), 1, "{:?}", features);

    let feature = &features[0];
    assert!((feature.mono_mass() - MASS).abs() < 1e-3);
    assert_eq!((feature.min_charge(), feature.max_charge()), (CHARGE, CHARGE));
    assert_eq!((feature.min_scan(), feature.max_scan()), (118, 122));
    assert_eq!(feature.representative().charge, CHARGE);
    assert!(feature.growth_correlation() > 0.99);
    assert!(feature.probability() > 0.5, "{}", feature.probability());
    assert!(feature.good_enough());
    assert!(feature.abundance() > 0.0);

    let probable = finder.get_probable_features(MASS).unwrap();
    assert_eq!(probable.len(), 1);
}

#[test]
fn test_partial_envelope_is_rejected() {
    // Two isotopes out of the whole envelope, at 30% of the clean intensity.
    let run = scenario_run(
        |col| envelope_peaks(MASS, CHARGE, 3e5 * elution(col, 10.0, 3.0), |rank| rank < 2),
        false,
    );
    let finder = FeatureFinder::new(&run, FeatureFinderConfig::default()).unwrap();
    assert!(finder.get_all_features(MASS).unwrap().is_empty());
}

#[test]
fn test_degraded_envelope_still_forms_a_cluster() {
    // The six most abundant isotopes at one height, the rest missing.
    let run = scenario_run(
        |col| match col {
            10 => envelope_peaks(MASS, CHARGE, 1.0, |rank| rank < 6)
                .into_iter()
                .map(|p| Peak::new(p.mz, 3e5))
                .collect(),
            _ => Vec::new(),
        },
        false,
    );
    let finder = FeatureFinder::new(&run, FeatureFinderConfig::default()).unwrap();
    let features = finder.get_all_features(MASS).unwrap();
    assert_eq!(features.len(), 1, "{:?}", features);

    let feature = &features[0];
    assert_eq!(feature.representative().charge, CHARGE);
    assert_eq!((feature.min_scan(), feature.max_scan()), (120, 120));
    let corr = feature.growth_correlation();
    assert!((0.7..0.99).contains(&corr), "{}", corr);

    let clean = FeatureFinder::new(&clean_run(false), FeatureFinderConfig::default())
        .unwrap()
        .get_all_features(MASS)
        .unwrap();
    assert!(corr < clean[0].growth_correlation());
    let envelope_corr = feature.score(ScoreKind::EnvelopeCorrelation);
    assert!(envelope_corr < 0.99, "{}", envelope_corr);
    assert!(envelope_corr < clean[0].score(ScoreKind::EnvelopeCorrelation));
}

#[test]
fn test_noise_has_no_features() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let noise: Vec<Vec<Peak>> = (0..NUM_COLUMNS).map(|_| noise_peaks(&mut rng, 300)).collect();
    let run = scenario_run(|col| noise[col as usize].clone(), false);
    let finder = FeatureFinder::new(&run, FeatureFinderConfig::default()).unwrap();
    for mass in [5_000.0, 10_000.0, 20_000.0] {
        assert!(finder.get_all_features(mass).unwrap().is_empty());
        assert!(finder.get_probable_features(mass).unwrap().is_empty());
    }
}

#[test]
fn test_empty_region_and_invalid_mass() {
    let run = scenario_run(|_| vec![Peak::new(300.0, 100.0)], false);
    let finder = FeatureFinder::new(&run, FeatureFinderConfig::default()).unwrap();
    assert!(finder.get_all_features(MASS).unwrap().is_empty());
    assert!(matches!(
        finder.get_all_features(-5.0),
        Err(FeatureFindingError::InvalidInput { .. })
    ));
    assert!(matches!(
        finder.get_all_features(f64::NAN),
        Err(FeatureFindingError::InvalidInput { .. })
    ));
}

#[test]
fn test_run_without_ms1_is_rejected() {
    let run = InMemoryRun::from_spectra(vec![Spectrum::new_ms2(
        1,
        IsolationWindow {
            target_mz: 500.0,
            lower_offset: 1.0,
            upper_offset: 1.0,
        },
        vec![],
    )])
    .unwrap();
    assert!(FeatureFinder::new(&run, FeatureFinderConfig::default()).is_err());
}

#[test]
fn test_noisy_envelope_is_found() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let noise: Vec<Vec<Peak>> = (0..NUM_COLUMNS).map(|_| noise_peaks(&mut rng, 200)).collect();
    let run = scenario_run(
        |col| {
            let mut peaks = envelope_peaks(MASS, CHARGE, 1e7 * elution(col, 10.0, 3.0), |_| true);
            peaks.extend(noise[col as usize].iter().copied());
            peaks
        },
        false,
    );
    let finder = FeatureFinder::new(&run, FeatureFinderConfig::default()).unwrap();
    let features = finder.get_all_features(MASS).unwrap();
    assert!(
        features
            .iter()
            .any(|f| (f.mono_mass() - MASS).abs() < 0.05 && f.representative().charge == CHARGE)
    );
}

#[test]
fn test_repeated_queries_are_identical() {
    let run = clean_run(false);
    let finder = FeatureFinder::new(&run, FeatureFinderConfig::default()).unwrap();
    let first: Vec<FeatureRecord> = finder
        .get_all_features(MASS)
        .unwrap()
        .iter()
        .map(|f| FeatureRecord::from_cluster(1, f))
        .collect();
    let second: Vec<FeatureRecord> = finder
        .get_all_features(MASS)
        .unwrap()
        .iter()
        .map(|f| FeatureRecord::from_cluster(1, f))
        .collect();
    assert_eq!(first, second);
}

#[test]
fn test_matrix_build_is_reproducible() {
    let run = clean_run(false);
    let (index, _) = PeakIndex::from_source(&run);
    let binning = FeatureFinderConfig::default().mass_binning();
    let query = MassQuery::for_mass(&binning, MASS);
    let isotopes = isotopes(MASS);
    let charges = ChargeRange::for_mass(MASS, 2, 60, 40).unwrap();
    let tol = Tolerance::Ppm(10.0);

    let mut matrix = FeatureMatrix::new(index.num_columns());
    matrix.build(&query, &isotopes, charges, &index, &tol);
    let first = matrix.fingerprint();
    // Filling another mass in between must not leak into the rebuild.
    let other = MassQuery::for_mass(&binning, 12_345.0);
    let other_charges = ChargeRange::for_mass(12_345.0, 2, 60, 40).unwrap();
    matrix.build(&other, &self::isotopes(12_345.0), other_charges, &index, &tol);
    matrix.build(&query, &isotopes, charges, &index, &tol);
    assert_eq!(first, matrix.fingerprint());

    let mut fresh = FeatureMatrix::new(index.num_columns());
    fresh.build(&query, &isotopes, charges, &index, &tol);
    assert_eq!(first, fresh.fingerprint());
}

#[test]
fn test_clusters_do_not_share_cells() {
    // Two elution peaks at charge 5 and one long one at charge 12.
    let run = scenario_run(
        |col| {
            let mut peaks = envelope_peaks(MASS, 5, 1e6 * pulse(col, 3.0, 1.0), |_| true);
            peaks.extend(envelope_peaks(MASS, 5, 1e6 * pulse(col, 17.0, 1.0), |_| true));
            peaks.extend(envelope_peaks(MASS, 12, 5e5 * elution(col, 10.0, 4.0), |_| true));
            peaks
        },
        false,
    );
    let config = FeatureFinderConfig::default();
    let (index, _) = PeakIndex::from_source(&run);
    let binning = config.mass_binning();
    let query = MassQuery::for_mass(&binning, MASS);
    let isotopes = Arc::new(isotopes(MASS));
    let charges = ChargeRange::for_mass(MASS, 2, 60, 40).unwrap();

    let mut matrix = FeatureMatrix::new(index.num_columns());
    matrix.build(&query, &isotopes, charges, &index, &config.tolerance);
    let clusters = ClusterFinder::new(&config.clustering, config.tolerance, &index)
        .find_clusters(&mut matrix, &isotopes);
    assert!(clusters.len() >= 2, "{}", clusters.len());

    let mut seen: HashSet<FeatureCell> = HashSet::new();
    for cluster in clusters.iter() {
        assert!(cluster.growth_correlation() >= config.clustering.cluster_correlation_cutoff);
        for cell in cluster.claimed_cells() {
            assert!(seen.insert(*cell), "cell {:?} claimed twice", cell);
        }
        let cols = cluster.col_range();
        for cell in cluster.member_cells() {
            assert!(cols.contains(cell.col));
            assert!(cluster.charge_range().contains(charges.charge(cell.row)));
        }
    }
    // The two charge 5 elution peaks are never joined.
    for cluster in clusters.iter().filter(|c| c.max_charge() == 5) {
        let cols = cluster.col_range();
        assert!(cols.end() - cols.start() < 14);
    }
}

#[test]
fn test_sweep_finds_the_feature_once() {
    let run = clean_run(false);
    let features = sweep(&run, sweep_config(0));
    let near: Vec<&FeatureCluster> = features
        .iter()
        .filter(|f| (f.mono_mass() - MASS).abs() < 0.1)
        .collect();
    assert_eq!(near.len(), 1, "{:?}", features.iter().map(|f| f.mono_mass()).collect::<Vec<_>>());
    assert!(near[0].good_enough());

    let best = features
        .iter()
        .max_by(|a, b| a.probability().total_cmp(&b.probability()))
        .unwrap();
    assert!((best.mono_mass() - MASS).abs() < 0.1);
}

#[test]
fn test_sweep_does_not_depend_on_thread_count() {
    let run = clean_run(false);
    let records = |threads| {
        sweep(&run, sweep_config(threads))
            .iter()
            .enumerate()
            .map(|(i, f)| FeatureRecord::from_cluster(i as u32 + 1, f))
            .collect::<Vec<_>>()
    };
    let single = records(1);
    assert!(!single.is_empty());
    assert_eq!(single, records(4));
}

/// A run whose spectra can no longer be read once `broken` is set.
struct BreakingRun {
    run: InMemoryRun,
    broken: AtomicBool,
}

impl SpectrumSource for BreakingRun {
    fn ms1_scan_numbers(&self) -> &[u32] {
        self.run.ms1_scan_numbers()
    }

    fn spectrum(&self, scan_number: u32) -> Option<&Spectrum> {
        if self.broken.load(Ordering::SeqCst) {
            panic!("scan {} is unreadable", scan_number);
        }
        self.run.spectrum(scan_number)
    }

    fn precursor_scan_number(&self, scan_number: u32) -> Option<u32> {
        self.run.precursor_scan_number(scan_number)
    }

    fn next_scan_number(&self, scan_number: u32, ms_level: u8) -> Option<u32> {
        self.run.next_scan_number(scan_number, ms_level)
    }

    fn fragmentation_scan_numbers(&self, mz: f64) -> Vec<u32> {
        self.run.fragmentation_scan_numbers(mz)
    }
}

#[test]
fn test_sweep_skips_panicking_bins() {
    let run = BreakingRun {
        run: clean_run(false),
        broken: AtomicBool::new(false),
    };
    let finder = FeatureFinder::new(&run, sweep_config(2)).unwrap();
    run.broken.store(true, Ordering::SeqCst);

    let mut features: Vec<FeatureCluster> = Vec::new();
    let summary = finder.extract_features(&mut features).unwrap();
    assert!(summary.failed_bins > 0);
    assert!(summary.failed_bins < summary.num_bins);
    assert_eq!(summary.features_written, 0);
    assert!(features.is_empty());
}

#[test]
fn test_sweep_without_signal_writes_nothing() {
    let run = scenario_run(|_| vec![Peak::new(300.0, 100.0)], false);
    assert!(sweep(&run, sweep_config(2)).is_empty());
}

#[test]
fn test_feature_table_round_trip() {
    let run = clean_run(false);
    let config = sweep_config(0);
    let dir = temp_dir("table");
    let tsv_path = dir.join("features.tsv");
    let parquet_path = dir.join("features.parquet");

    let finder = FeatureFinder::new(&run, config).unwrap();
    let mut writer = FeatureTsvWriter::new(&tsv_path).unwrap();
    let summary = finder.extract_features(&mut writer).unwrap();
    writer.close().unwrap();

    let records = read_feature_table(&tsv_path).unwrap();
    assert_eq!(records.len(), summary.features_written);
    assert!(records.iter().enumerate().all(|(i, r)| r.feature_id == i as u32 + 1));
    let best = records
        .iter()
        .find(|r| (r.mono_mass - MASS).abs() < 0.1)
        .unwrap();
    assert_eq!((best.min_charge, best.max_charge), (CHARGE, CHARGE));
    assert!(best.min_scan >= 100 && best.max_scan <= 140);
    assert!(best.good_enough);
    assert!(!best.envelope.is_empty());

    let mut parquet = FeatureParquetWriter::new(&parquet_path, 2).unwrap();
    for record in records.iter() {
        parquet.add(record.clone()).unwrap();
    }
    parquet.close().unwrap();
    assert!(std::fs::metadata(&parquet_path).unwrap().len() > 0);
    assert!(FeatureParquetWriter::new(&parquet_path, 2).is_err());

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_empty_sweep_still_writes_header() {
    let run = scenario_run(|_| vec![Peak::new(300.0, 100.0)], false);
    let dir = temp_dir("empty_table");
    let path = dir.join("features.tsv");
    let finder = FeatureFinder::new(&run, sweep_config(1)).unwrap();
    let mut writer = FeatureTsvWriter::new(&path).unwrap();
    finder.extract_features(&mut writer).unwrap();
    writer.close().unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.trim_end(), FeatureRecord::COLUMNS.join("\t"));
    assert!(read_feature_table(&path).unwrap().is_empty());
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_ms2_scans_of_feature() {
    let run = clean_run(true);
    let finder = FeatureFinder::new(&run, FeatureFinderConfig::default()).unwrap();
    let features = finder.get_all_features(MASS).unwrap();
    assert_eq!(features.len(), 1);
    let feature = &features[0];

    let scans = finder.matching_ms2_scan_numbers(feature);
    assert!(!scans.is_empty());
    assert!(scans.windows(2).all(|w| w[0] < w[1]));
    assert!(
        scans
            .iter()
            .all(|&s| s % 2 == 1 && feature.min_scan() < s && s < feature.max_scan())
    );

    let records = vec![FeatureRecord::from_cluster(1, feature)];
    let map = FeatureMs2Map::from_records(&run, &records, Tolerance::Ppm(10.0), 0.5);
    assert_eq!(map.num_features(), 1);
    assert_eq!(map.matching_ms2_scan_numbers(MASS), scans);
    assert!(map.matching_ms2_scan_numbers(MASS + 5.0).is_empty());
    let masses = map.matching_masses(scans[0]);
    assert_eq!(masses.len(), 1);
    assert!((masses[0] - feature.mono_mass()).abs() < 1e-9);
    assert!(map.matching_masses(100).is_empty());

    // Below the probability cutoff nothing is mapped.
    let strict = FeatureMs2Map::from_records(&run, &records, Tolerance::Ppm(10.0), 0.999);
    assert_eq!(strict.num_features(), 0);
    assert!(strict.matching_ms2_scan_numbers(MASS).is_empty());
}
