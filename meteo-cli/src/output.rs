use meteo_core::{CurrentConditions, ForecastDetail, LocationCandidate, MeteoError};

pub fn conditions_line(c: &CurrentConditions) -> String {
    let pin = if c.is_current_location { "📍 " } else { "   " };
    format!("{pin}{:<40} {:>8}  {}", c.label, c.temperature, c.category)
}

pub fn candidate_line(c: &LocationCandidate) -> String {
    format!("{} ({:.2}, {:.2})", c.display_label(), c.latitude, c.longitude)
}

pub fn detail_block(d: &ForecastDetail) -> String {
    format!(
        "{}\n  Now:     {} ({})\n  Min/Max: {}° / {}°\n  Wind:    {}\n  Icon:    {}",
        d.label,
        d.temperature,
        d.category,
        d.min_temperature,
        d.max_temperature,
        d.wind,
        d.category.icon_name()
    )
}

/// Short notice shown instead of a failed row.
pub fn failure_notice(name: &str, err: &MeteoError) -> String {
    match err {
        MeteoError::IndexOutOfRange { .. } | MeteoError::MalformedForecast(_) => {
            format!("   {name}: weather unavailable for this hour")
        }
        _ => format!("   {name}: {err}"),
    }
}
