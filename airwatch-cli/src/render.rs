use std::fmt::Write;

use airwatch_core::{
    Reading, SessionState, SessionView, classify_severity, extract_conditions, extract_pollutants,
    recommendations,
};
use chrono::Local;

/// Human-readable report for a session snapshot.
pub fn render(state: &SessionState) -> String {
    match state.view() {
        SessionView::Loading => "Detecting your location...".to_string(),
        SessionView::HardError(err) => format!(
            "Unable to Load Data\n{}\n\nRetry, or search for a city with `airwatch search \"City, Country\"`.",
            err.message
        ),
        SessionView::Ready { reading, banner, refreshing } => {
            let mut out = String::new();
            if let Some(err) = banner {
                let _ = writeln!(out, "! Showing last known data: {}\n", err.message);
            }
            render_reading(&mut out, reading, state);
            if refreshing {
                out.push_str("\n(refreshing...)");
            }
            out
        }
    }
}

fn render_reading(out: &mut String, reading: &Reading, state: &SessionState) {
    let tier = classify_severity(reading.aqi);

    let _ = writeln!(out, "AirWatch | {} (location: {})", reading.station_name, state.location_method.as_str());
    let _ = writeln!(out, "AQI {}  {} {}", reading.aqi, tier.emoji, tier.label);
    let _ = writeln!(out, "{}", tier.advisory);

    if let Some(updated) = state.last_updated() {
        let _ = writeln!(out, "Updated {}", updated.with_timezone(&Local).format("%H:%M:%S"));
    }

    let pollutants = extract_pollutants(&reading.measurements);
    if !pollutants.is_empty() {
        let _ = writeln!(out, "\nPollutant Breakdown");
        for p in &pollutants {
            let _ = writeln!(out, "  {:<6} {:>7}  {}", p.name, p.value, p.description);
        }
    }

    let conditions = extract_conditions(&reading.measurements);
    if !conditions.is_empty() {
        let _ = writeln!(out, "\nEnvironmental Conditions");
        if let Some(t) = conditions.temperature_c {
            let _ = writeln!(out, "  Temperature {t}°C");
        }
        if let Some(h) = conditions.humidity_pct {
            let _ = writeln!(out, "  Humidity    {h}%");
        }
        if let Some(p) = conditions.pressure_hpa {
            let _ = writeln!(out, "  Pressure    {p} hPa");
        }
        if let Some(w) = conditions.wind {
            let _ = writeln!(out, "  Wind        {w} m/s");
        }
    }

    let _ = writeln!(out, "\nHealth Recommendations");
    for rec in recommendations(tier.level) {
        let _ = writeln!(out, "  {rec}");
    }

    let _ = write!(out, "\nData provided by World Air Quality Index (https://waqi.info/)");
}
