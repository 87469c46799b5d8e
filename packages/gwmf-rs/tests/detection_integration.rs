use gwmf_rs::{
    matched_filter, BankEntry, ChirpParams, Injection, NewtonianChirp, Psd, SearchConfig,
    SearchRunner, StrainSource, SyntheticStrain, TimeSeries, WaveformGenerator,
};

fn window_energy(series: &TimeSeries<f64>, start: f64, end: f64) -> f64 {
    series.time_slice(start, end).unwrap().energy()
}

#[test]
fn test_binary_neutron_star_injection_recovered_within_one_sample() {
    let fs = 4096.0;
    let dt = 1.0 / fs;
    let t_inj = 48.0;

    let params = ChirpParams::new(1.4, 1.4, 35.0, dt);
    let template = NewtonianChirp
        .generate(&params)
        .unwrap()
        .plus_template()
        .unwrap()
        .trailing(32.0)
        .unwrap()
        .normalized()
        .unwrap();
    assert_eq!(template.len(), 32 * 4096);

    let source = SyntheticStrain::new(fs, 1.0, 20150914)
        .unwrap()
        .with_injection(Injection::new(template.clone(), t_inj, 50.0))
        .unwrap();
    let data = source.strain("H1", 0.0, 96.0).unwrap();
    let psd = Psd::flat(2.0 * dt, 1.0 / 96.0, data.len() / 2 + 1).unwrap();

    let snr = matched_filter(&template, &data, &psd, 20.0, 0).unwrap();
    let peak = snr.peak();

    assert!(
        (peak.time - t_inj).abs() <= dt,
        "peak at {} s, injected at {} s",
        peak.time,
        t_inj
    );
    assert!(peak.snr() > 40.0 && peak.snr() < 60.0, "snr {}", peak.snr());
}

fn bank(dt: f64) -> Vec<BankEntry> {
    [(10.0, 10.0), (3.0, 3.0), (30.0, 30.0)]
        .iter()
        .map(|&(m1, m2)| BankEntry::from_masses(&NewtonianChirp, m1, m2, 30.0, dt).unwrap())
        .collect()
}

fn injected_source(fs: f64) -> SyntheticStrain {
    let params = ChirpParams::new(10.0, 10.0, 30.0, 1.0 / fs);
    let template = NewtonianChirp
        .generate(&params)
        .unwrap()
        .plus_template()
        .unwrap();
    let injection = Injection::with_optimal_snr(template, 30.0, 30.0, 1.0).unwrap();
    SyntheticStrain::new(fs, 1.0, 7)
        .unwrap()
        .with_injection(injection)
        .unwrap()
}

#[test]
fn test_bank_search_ranks_matching_template_first() {
    let fs = 1024.0;
    let source = injected_source(fs);
    let runner = SearchRunner::new(SearchConfig::default()).unwrap();

    let report = runner
        .search(&source, "H1", 0.0, 64.0, &bank(1.0 / fs), None)
        .unwrap();

    assert_eq!(report.detections.len(), 3);
    let best = report.best().unwrap();
    assert_eq!(best.template, "newtonian_chirp(10, 10)");
    assert!((best.time - 30.0).abs() < 0.005, "time {}", best.time);
    assert!(best.snr > 20.0, "snr {}", best.snr);
    assert!(report.detections[1].snr < best.snr);
}

#[test]
fn test_subtraction_removes_power_only_for_matching_template() {
    let fs = 1024.0;
    let source = injected_source(fs);
    let strain = source.strain("H1", 0.0, 64.0).unwrap();
    let runner = SearchRunner::new(SearchConfig::default()).unwrap();
    let conditioned = runner.condition(&strain).unwrap();

    let bank = bank(1.0 / fs);
    let report = conditioned.run(&bank, Some((29.5, 30.5))).unwrap();

    let (start, end) = (27.5, 30.5);
    let before = window_energy(conditioned.data(), start, end);
    let reduction = |name: &str| {
        let entry = bank.iter().find(|e| e.name == name).unwrap();
        let detection = report
            .detections
            .iter()
            .find(|d| d.template == name)
            .unwrap();
        let residual = conditioned.residual(entry, detection).unwrap();
        assert_eq!(residual.len(), conditioned.data().len());
        before - window_energy(&residual, start, end)
    };

    let matched = reduction("newtonian_chirp(10, 10)");
    let mismatched = reduction("newtonian_chirp(30, 30)");

    // An SNR-30 signal carries about 900 units of energy in unit-variance noise
    assert!(matched > 600.0, "matched reduction {}", matched);
    assert!(
        mismatched < 0.3 * matched,
        "mismatched reduction {} vs matched {}",
        mismatched,
        matched
    );
}

#[test]
fn test_whitened_conditioned_data_is_finite() {
    let fs = 1024.0;
    let source = injected_source(fs);
    let strain = source.strain("H1", 0.0, 64.0).unwrap();
    let conditioned = SearchRunner::new(SearchConfig::default())
        .unwrap()
        .condition(&strain)
        .unwrap();

    let white = conditioned.whiten(conditioned.data()).unwrap();
    assert_eq!(white.len(), conditioned.data().len());
    assert!(white.data().iter().all(|x| x.is_finite()));
}
