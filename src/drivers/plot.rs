use std::io::Cursor;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::*;
use crate::drivers::error::AcquisitionError;
use crate::types::Sample;
#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub flux_color: RGBColor,
    pub palette: Vec<RGBColor>,
}
impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 800,
            background: WHITE,
            flux_color: BLUE,
            palette: vec![RED, GREEN, MAGENTA, CYAN, BLACK, YELLOW],
        }
    }
}
/// Minutes since the first sample, used as the shared x axis.
pub fn minutes_since_start(samples: &[Sample]) -> Vec<f64> {
    let Some(first) = samples.first() else {
        return Vec::new();
    };
    samples
        .iter()
        .map(|s| (s.timestamp - first.timestamp).num_milliseconds() as f64 / 60_000.0)
        .collect()
}
fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values.fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if lo > hi {
        return (0.0, 1.0);
    }
    let pad = ((hi - lo) * 0.1).max(0.5);
    (lo - pad, hi + pad)
}
/// Two stacked panels: heat flux on top, one temperature line per sensor below.
pub fn render_history_png(
    samples: &[Sample],
    sensor_names: &[String],
    style: &PlotStyle,
) -> Result<Vec<u8>, AcquisitionError> {
    if samples.is_empty() {
        return Err(AcquisitionError::Plot("history has no samples".into()));
    }
    let x = minutes_since_start(samples);
    let x_max = x.last().copied().unwrap_or(0.0).max(1.0);
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let panels = root.split_evenly((2, 1));
        let flux_range = padded_range(samples.iter().map(|s| s.heat_flux));
        let mut flux_chart = ChartBuilder::on(&panels[0])
            .margin(10)
            .caption("Heat flux (W/m²)", ("sans-serif", 18))
            .set_label_area_size(LabelAreaPosition::Left, 55)
            .set_label_area_size(LabelAreaPosition::Bottom, 30)
            .build_cartesian_2d(0f64..x_max, flux_range.0..flux_range.1)?;
        flux_chart.configure_mesh().light_line_style(&BLACK.mix(0.05)).draw()?;
        flux_chart.draw_series(LineSeries::new(
            x.iter().copied().zip(samples.iter().map(|s| s.heat_flux)),
            &style.flux_color,
        ))?;
        let temp_range = padded_range(samples.iter().flat_map(|s| s.temperatures.iter().copied()));
        let mut temp_chart = ChartBuilder::on(&panels[1])
            .margin(10)
            .caption("Temperature (°C)", ("sans-serif", 18))
            .set_label_area_size(LabelAreaPosition::Left, 55)
            .set_label_area_size(LabelAreaPosition::Bottom, 30)
            .build_cartesian_2d(0f64..x_max, temp_range.0..temp_range.1)?;
        temp_chart
            .configure_mesh()
            .x_desc("minutes")
            .light_line_style(&BLACK.mix(0.05))
            .draw()?;
        for (idx, name) in sensor_names.iter().enumerate() {
            let color = style.palette[idx % style.palette.len()];
            let series = x
                .iter()
                .copied()
                .zip(samples.iter())
                .filter_map(|(t, s)| s.temperatures.get(idx).map(|v| (t, *v)));
            temp_chart
                .draw_series(LineSeries::new(series, &color))?
                .label(name.clone())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
        }
        temp_chart
            .configure_series_labels()
            .border_style(&BLACK.mix(0.3))
            .background_style(&style.background.mix(0.8))
            .draw()?;
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}
fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, AcquisitionError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| AcquisitionError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeDelta};
    #[test]
    fn x_axis_is_minutes_from_first_sample() {
        let start = Local::now();
        let samples: Vec<Sample> = (0..3)
            .map(|i| Sample {
                timestamp: start + TimeDelta::seconds(90 * i),
                heat_flux: 1.0,
                temperatures: vec![20.0],
            })
            .collect();
        assert_eq!(minutes_since_start(&samples), vec![0.0, 1.5, 3.0]);
        assert!(minutes_since_start(&[]).is_empty());
    }
    #[test]
    fn empty_history_is_not_rendered() {
        let err = render_history_png(&[], &["Window".to_owned()], &PlotStyle::default()).unwrap_err();
        assert!(matches!(err, AcquisitionError::Plot(_)));
    }
    #[test]
    fn ranges_are_padded() {
        assert_eq!(padded_range([5.0, 5.0].into_iter()), (4.5, 5.5));
        assert_eq!(padded_range(std::iter::empty()), (0.0, 1.0));
        let (lo, hi) = padded_range([0.0, 100.0].into_iter());
        assert!((lo + 10.0).abs() < 1e-9 && (hi - 110.0).abs() < 1e-9);
    }
}
