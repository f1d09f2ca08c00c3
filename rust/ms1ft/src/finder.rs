use crate::clustering::{
    ClusterFinder,
    FeatureCluster,
};
use crate::config::FeatureFinderConfig;
use crate::errors::{
    FeatureFindingError,
    Result,
};
use crate::isotopes::{
    Averagine,
    IsotopeList,
};
use crate::matrix::{
    ChargeRange,
    FeatureMatrix,
    MassQuery,
};
use crate::scoring::{
    FeatureScorer,
    LocalBackgroundTester,
};
use crate::utils::ion::isotope_mz;
use ms1query::{
    MassBinning,
    PeakClaims,
    PeakIndex,
    SpectrumSource,
};
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::{
    debug,
    info,
};

/// Everything needed to look for features in one run.
///
/// Holds the peak index, the isotope model cache and the worker pool, so
/// any number of candidate masses can be queried (concurrently) against it.
pub struct FeatureFinder<'a, S: SpectrumSource + ?Sized> {
    pub(crate) run: &'a S,
    pub(crate) config: FeatureFinderConfig,
    pub(crate) index: PeakIndex,
    pub(crate) binning: MassBinning,
    averagine: Averagine,
    tester: LocalBackgroundTester,
    pub(crate) pool: rayon::ThreadPool,
    // Single mass queries see every peak as active.
    unclaimed: PeakClaims,
}

impl<'a, S: SpectrumSource + ?Sized> FeatureFinder<'a, S> {
    pub fn new(run: &'a S, config: FeatureFinderConfig) -> Result<Self> {
        config.validate()?;
        let (index, stats) = PeakIndex::from_source(run);
        info!("{}", stats);
        if index.num_columns() == 0 {
            return Err(FeatureFindingError::invalid_input(
                "the run does not contain any MS1 scan",
            ));
        }

        let mut builder = rayon::ThreadPoolBuilder::new();
        if config.max_threads > 0 {
            builder = builder.num_threads(config.max_threads);
        }
        let pool = builder.build()?;
        debug!("Feature finder using {} threads", pool.current_num_threads());

        Ok(Self {
            run,
            binning: config.mass_binning(),
            tester: LocalBackgroundTester::new(config.tolerance),
            config,
            index,
            averagine: Averagine::new(),
            pool,
            unclaimed: PeakClaims::new(0),
        })
    }

    pub fn config(&self) -> &FeatureFinderConfig {
        &self.config
    }

    pub fn index(&self) -> &PeakIndex {
        &self.index
    }

    pub fn binning(&self) -> &MassBinning {
        &self.binning
    }

    fn isotopes_for(&self, mass: f64) -> Result<Arc<IsotopeList>> {
        IsotopeList::build(
            mass,
            &self.averagine,
            self.config.max_isotopes,
            self.config.relative_intensity_threshold,
        )
        .map(Arc::new)
    }

    /// Builds the matrix of one candidate mass, clusters it and scores the
    /// clusters against the current peak claims. Only active clusters are returned.
    #[cfg_attr(
        feature = "instrumentation",
        tracing::instrument(skip_all, level = "trace")
    )]
    pub(crate) fn process_query(
        &self,
        query: &MassQuery,
        matrix: &mut FeatureMatrix,
        claims: &PeakClaims,
    ) -> Result<Vec<FeatureCluster>> {
        let isotopes = self.isotopes_for(query.mass)?;
        let Some(charge_range) = ChargeRange::for_mass(
            query.mass,
            self.config.min_charge,
            self.config.max_charge,
            self.config.max_charge_length,
        ) else {
            return Ok(Vec::new());
        };

        matrix.build(query, &isotopes, charge_range, &self.index, &self.config.tolerance);
        let mut clusters = ClusterFinder::new(&self.config.clustering, self.config.tolerance, &self.index)
            .find_clusters(matrix, &isotopes);

        let scorer = FeatureScorer::new(
            self.run,
            &self.index,
            claims,
            &self.tester,
            self.config.tolerance,
        );
        for cluster in clusters.iter_mut() {
            scorer.score(cluster, matrix);
        }
        clusters.retain(|c| c.is_active());
        Ok(clusters)
    }

    /// Every scored, active cluster found for the mass.
    pub fn get_all_features(&self, mass: f64) -> Result<Vec<FeatureCluster>> {
        let query = MassQuery::for_mass(&self.binning, mass);
        let mut matrix = FeatureMatrix::new(self.index.num_columns());
        self.pool
            .install(|| self.process_query(&query, &mut matrix, &self.unclaimed))
    }

    /// Clusters that are GoodEnough or reach the probability threshold.
    pub fn get_probable_features(&self, mass: f64) -> Result<Vec<FeatureCluster>> {
        let threshold = self.config.probability_threshold;
        let mut features = self.get_all_features(mass)?;
        features.retain(|c| c.good_enough() || c.probability() >= threshold);
        Ok(features)
    }

    /// MS2 scans strictly inside the scan range of the feature that
    /// isolated its most abundant isotope, at any searched charge.
    pub fn matching_ms2_scan_numbers(&self, cluster: &FeatureCluster) -> Vec<u32> {
        fragmentation_scans_within(
            self.run,
            cluster.mono_mass(),
            cluster.isotopes().most_abundant().index,
            self.config.min_charge..=self.config.max_charge,
            (cluster.min_scan(), cluster.max_scan()),
        )
    }
}

/// Sorted, distinct MS2 scans strictly between `scans.0` and `scans.1` whose
/// isolation window contains the given isotope of `mass` at one of `charges`.
pub(crate) fn fragmentation_scans_within<S: SpectrumSource + ?Sized>(
    run: &S,
    mass: f64,
    isotope_index: u32,
    charges: RangeInclusive<u32>,
    scans: (u32, u32),
) -> Vec<u32> {
    let mut out: Vec<u32> = charges
        .flat_map(|charge| run.fragmentation_scan_numbers(isotope_mz(mass, charge, isotope_index)))
        .filter(|&scan| scans.0 < scan && scan < scans.1)
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}
