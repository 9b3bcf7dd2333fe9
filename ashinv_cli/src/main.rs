use std::fs;
use std::io;
use std::panic;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use ashinv::downsample::{downsample, Aggregator};
use ashinv::field::MaskedField;
use ashinv::units::{to_mass_flux, uniform_step_seconds, MassUnit};
use ashinv::{load_inversion, Inversion, LoadOptions};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};
use ndarray::Array2;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use rayon::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Plot volcanic ash inversion results", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the a-priori/inverted emission fields and convergence traces
    Plot(PlotArgs),
    /// Render a large system matrix after adaptive downsampling
    Matrix(MatrixArgs),
}

#[derive(Parser, Debug)]
struct PlotArgs {
    /// Inversion JSON files to plot
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Output figure path (single input only; defaults next to the input)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Emit SVG instead of PNG
    #[arg(long, action = ArgAction::SetTrue)]
    svg: bool,

    /// Unit for the emission fields (tg|kg/(m*s))
    #[arg(long, default_value = "tg")]
    unit: String,

    /// Colormap for the emission fields
    #[arg(long, value_enum, default_value_t = ColormapOpt::Default)]
    colormap: ColormapOpt,

    /// Skip the emitted-sum overlay on the field panels
    #[arg(long, action = ArgAction::SetTrue)]
    no_plotsum: bool,

    /// Keep unused elevations and timesteps
    #[arg(long, action = ArgAction::SetTrue)]
    no_prune: bool,

    /// Threshold below which rows/columns count as empty when pruning
    #[arg(long, default_value_t = 0.0)]
    prune_zero: f64,

    /// Explicit first timestep to keep (overrides the computed bound)
    #[arg(long)]
    valid_times_min: Option<usize>,

    /// Explicit one-past-last timestep to keep (overrides the computed bound)
    #[arg(long)]
    valid_times_max: Option<usize>,

    /// Panel stacking direction
    #[arg(long, value_enum, default_value_t = OrientationOpt::Vertical)]
    orientation: OrientationOpt,

    /// Width of each panel in pixels
    #[arg(long, default_value_t = 900)]
    panel_width: u32,

    /// Height of each panel in pixels
    #[arg(long, default_value_t = 320)]
    panel_height: u32,

    /// Color scale maximum (defaults to the larger field maximum)
    #[arg(long)]
    vmax: Option<f64>,

    /// Upper bound of the relative-difference color scale
    #[arg(long, default_value_t = 2.0)]
    r_vmax: f64,

    /// Also write the reconstructed fields as CSV next to the figure
    #[arg(long, action = ArgAction::SetTrue)]
    csv: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct MatrixArgs {
    /// JSON file holding a dense 2D matrix (array of rows)
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Output figure path (defaults next to the input)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Emit SVG instead of PNG
    #[arg(long, action = ArgAction::SetTrue)]
    svg: bool,

    /// Block aggregator used while downsampling
    #[arg(long, value_enum, default_value_t = AggregatorOpt::Median)]
    agg: AggregatorOpt,

    /// Figure width in pixels (also the downsampling target)
    #[arg(long, default_value_t = 1800)]
    width: u32,

    /// Figure height in pixels (also the downsampling target)
    #[arg(long, default_value_t = 1800)]
    height: u32,

    /// Plot the matrix at full resolution
    #[arg(long, action = ArgAction::SetTrue)]
    no_downsample: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColormapOpt {
    Default,
    Alternative,
    Birthe,
    Stohl,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OrientationOpt {
    Vertical,
    Horizontal,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum AggregatorOpt {
    Mean,
    Median,
    Max,
    Min,
}

impl From<AggregatorOpt> for Aggregator {
    fn from(value: AggregatorOpt) -> Self {
        match value {
            AggregatorOpt::Mean => Aggregator::Mean,
            AggregatorOpt::Median => Aggregator::Median,
            AggregatorOpt::Max => Aggregator::Max,
            AggregatorOpt::Min => Aggregator::Min,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = match &cli.command {
        Command::Plot(args) if args.verbose => "debug",
        Command::Matrix(args) if args.verbose => "debug",
        _ => "info",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Plot(args) => handle_plot(args),
        Command::Matrix(args) => handle_matrix(args),
    }
}

fn handle_plot(args: PlotArgs) -> Result<()> {
    if args.output.is_some() && args.inputs.len() > 1 {
        return Err(anyhow!("--output only makes sense with a single input"));
    }
    let unit: MassUnit = args.unit.parse()?;

    let options = LoadOptions {
        prune: !args.no_prune,
        prune_zero: args.prune_zero,
        valid_times_min: args.valid_times_min,
        valid_times_max: args.valid_times_max,
    };

    let inputs: Vec<(usize, PathBuf)> = args.inputs.iter().cloned().enumerate().collect();
    let mut loaded: Vec<(usize, Inversion)> = inputs
        .par_iter()
        .map(|(id, path)| -> Result<(usize, Inversion)> {
            let inversion = load_inversion(path, &options)
                .with_context(|| format!("failed to load {}", path.display()))?;
            Ok((*id, inversion))
        })
        .collect::<Result<Vec<_>>>()?;
    loaded.sort_by_key(|(id, _)| *id);

    let ext = if args.svg { "svg" } else { "png" };
    for (id, mut inversion) in loaded {
        let input = &args.inputs[id];
        if unit == MassUnit::KgPerMeterSecond {
            let step = uniform_step_seconds(&inversion.emission_times)?;
            inversion.a_priori =
                to_mass_flux(&inversion.a_priori, &inversion.level_heights, step)?;
            inversion.a_posteriori =
                to_mass_flux(&inversion.a_posteriori, &inversion.level_heights, step)?;
        }
        let (rows, cols) = inversion.a_priori.dim();
        info!(
            "Reconstructed {}: {} levels x {} timesteps",
            input.display(),
            rows,
            cols
        );

        let output = match args.output.as_ref() {
            Some(path) => path.clone(),
            None => input.with_extension(ext),
        };

        if args.csv {
            let csv_path = output.with_extension("csv");
            write_fields_csv(&inversion, unit, &csv_path)?;
            info!("Wrote field CSV: {}", csv_path.display());
        }

        let figure = FigureOptions {
            unit,
            colormap: args.colormap.stops(),
            plotsum: !args.no_plotsum,
            vertical: matches!(args.orientation, OrientationOpt::Vertical),
            panel_width: args.panel_width,
            panel_height: args.panel_height,
            vmax: args.vmax,
            r_vmax: args.r_vmax,
        };
        if let Err(err) = render_inversion_guard(&inversion, &output, args.svg, &figure) {
            warn!("Skipping figure ({}): {}", output.display(), err);
        } else {
            info!("Wrote figure: {}", output.display());
        }
    }

    Ok(())
}

fn handle_matrix(args: MatrixArgs) -> Result<()> {
    let matrix = read_matrix(&args.input)?;
    let (rows, cols) = matrix.dim();
    info!("Loaded matrix {}x{}", rows, cols);

    // Color scale floors keep an all-zero matrix renderable on a log scale.
    let vmin = matrix.iter().copied().fold(f64::MAX, f64::min).max(1e-10);
    let vmax = matrix.iter().copied().fold(f64::MIN, f64::max).max(2e-10);

    let reduced = if args.no_downsample {
        matrix
    } else {
        let target = (args.height as usize, args.width as usize);
        let reduced = downsample(&matrix, target, args.agg.into());
        if reduced.dim() != (rows, cols) {
            info!(
                "Downsampled to {}x{} ({:?})",
                reduced.nrows(),
                reduced.ncols(),
                Aggregator::from(args.agg)
            );
        }
        reduced
    };
    // Negative entries only confuse the log scale; clamp for display.
    let reduced = reduced.mapv(|v| v.max(0.0));

    let ext = if args.svg { "svg" } else { "png" };
    let output = match args.output.as_ref() {
        Some(path) => path.clone(),
        None => args.input.with_extension(ext),
    };
    let size = (args.width, args.height);
    let render = || -> Result<()> {
        if args.svg {
            let root = SVGBackend::new(&output, size).into_drawing_area();
            draw_matrix_figure(root, &reduced, (rows, cols), vmin, vmax)
        } else {
            let root = BitMapBackend::new(&output, size).into_drawing_area();
            draw_matrix_figure(root, &reduced, (rows, cols), vmin, vmax)
        }
    };
    match panic::catch_unwind(panic::AssertUnwindSafe(render)) {
        Ok(result) => result?,
        Err(_) => return Err(anyhow!("plotting backend panicked")),
    }
    info!("Wrote figure: {}", output.display());
    Ok(())
}

fn read_matrix(path: &Path) -> Result<Array2<f64>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let rows: Vec<Vec<f64>> =
        serde_json::from_str(&text).with_context(|| format!("{} is not a 2D JSON array", path.display()))?;
    let nrows = rows.len();
    let ncols = rows.first().map(Vec::len).unwrap_or_default();
    if nrows == 0 || ncols == 0 {
        return Err(anyhow!("matrix in {} is empty", path.display()));
    }
    let mut flat = Vec::with_capacity(nrows * ncols);
    for row in &rows {
        if row.len() != ncols {
            return Err(anyhow!("matrix in {} has ragged rows", path.display()));
        }
        flat.extend_from_slice(row);
    }
    Ok(Array2::from_shape_vec((nrows, ncols), flat)?)
}

fn write_fields_csv(inversion: &Inversion, unit: MassUnit, path: &Path) -> Result<()> {
    let file = fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    let prior_header = format!("a_priori_{}", unit.label());
    let posterior_header = format!("a_posteriori_{}", unit.label());
    writer.write_record([
        "emission_time",
        "level",
        "level_top_m",
        prior_header.as_str(),
        posterior_header.as_str(),
    ])?;

    let boundaries = level_boundaries(inversion);
    let (rows, cols) = inversion.a_priori.dim();
    for t in 0..cols {
        for a in 0..rows {
            writer.write_record([
                inversion.emission_times[t].to_rfc3339(),
                a.to_string(),
                format!("{:.0}", boundaries[a + 1]),
                inversion
                    .a_priori
                    .get(a, t)
                    .map(|v| format!("{v:.6}"))
                    .unwrap_or_default(),
                inversion
                    .a_posteriori
                    .get(a, t)
                    .map(|v| format!("{v:.6}"))
                    .unwrap_or_default(),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Cumulative level boundary altitudes starting at the volcano summit.
fn level_boundaries(inversion: &Inversion) -> Vec<f64> {
    let mut boundaries = Vec::with_capacity(inversion.level_heights.len() + 1);
    let mut altitude = inversion.volcano_altitude;
    boundaries.push(altitude);
    for height in inversion.level_heights.iter() {
        altitude += height;
        boundaries.push(altitude);
    }
    boundaries
}

struct FigureOptions {
    unit: MassUnit,
    colormap: &'static [(f64, RGBColor)],
    plotsum: bool,
    vertical: bool,
    panel_width: u32,
    panel_height: u32,
    vmax: Option<f64>,
    r_vmax: f64,
}

fn render_inversion_guard(
    inversion: &Inversion,
    path: &Path,
    svg: bool,
    figure: &FigureOptions,
) -> Result<(), String> {
    let size = if figure.vertical {
        (figure.panel_width, figure.panel_height * 4)
    } else {
        (figure.panel_width * 4, figure.panel_height)
    };
    let render = || -> Result<(), String> {
        if svg {
            let root = SVGBackend::new(path, size).into_drawing_area();
            draw_inversion_figure(root, inversion, figure)
                .map_err(|e| format!("plotting error: {e}"))
        } else {
            let root = BitMapBackend::new(path, size).into_drawing_area();
            draw_inversion_figure(root, inversion, figure)
                .map_err(|e| format!("plotting error: {e}"))
        }
    };

    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

fn draw_inversion_figure<DB>(
    root: DrawingArea<DB, Shift>,
    inversion: &Inversion,
    figure: &FigureOptions,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let areas = if figure.vertical {
        root.split_evenly((4, 1))
    } else {
        root.split_evenly((1, 4))
    };

    let vmax = figure.vmax.unwrap_or_else(|| {
        inversion
            .a_priori
            .max()
            .unwrap_or(0.0)
            .max(inversion.a_posteriori.max().unwrap_or(0.0))
    });
    let vmax = if vmax > 0.0 { vmax } else { 1.0 };

    let prior_sums = inversion.a_priori.column_sums();
    let posterior_sums = inversion.a_posteriori.column_sums();
    let sum_max = prior_sums
        .iter()
        .chain(posterior_sums.iter())
        .copied()
        .fold(1.0e-10_f64, f64::max)
        * 1.3;

    let stops = figure.colormap;
    let ash_color = move |v: f64| sample_colormap(stops, (v / vmax).clamp(0.0, 1.0));

    let overlays_prior: Vec<SumOverlay> = if figure.plotsum {
        vec![SumOverlay {
            label: "A priori",
            sums: &prior_sums,
            color: RGBColor(60, 60, 60),
        }]
    } else {
        Vec::new()
    };
    let overlays_posterior: Vec<SumOverlay> = if figure.plotsum {
        vec![
            SumOverlay {
                label: "A priori",
                sums: &prior_sums,
                color: RGBColor(60, 60, 60),
            },
            SumOverlay {
                label: "Inverted",
                sums: &posterior_sums,
                color: RGBColor(30, 144, 255),
            },
        ]
    } else {
        Vec::new()
    };

    draw_field_panel(
        &areas[0],
        &format!("A priori ({})", figure.unit.label()),
        &inversion.a_priori,
        inversion,
        &ash_color,
        &overlays_prior,
        sum_max,
    )?;
    draw_field_panel(
        &areas[1],
        &format!("Inverted ({})", figure.unit.label()),
        &inversion.a_posteriori,
        inversion,
        &ash_color,
        &overlays_posterior,
        sum_max,
    )?;

    let difference = relative_difference(&inversion.a_posteriori, &inversion.a_priori);
    let r_vmax = figure.r_vmax;
    let diff_color = move |v: f64| diverging_color(v, -1.0, r_vmax);
    draw_field_panel(
        &areas[2],
        "(Inverted - A priori) / A priori",
        &difference,
        inversion,
        &diff_color,
        &[],
        sum_max,
    )?;

    draw_convergence_panel(&areas[3], inversion)?;

    root.present()?;
    Ok(())
}

/// Cell-wise (b - a) / a over cells valid in both fields.
fn relative_difference(b: &MaskedField, a: &MaskedField) -> MaskedField {
    let (rows, cols) = a.dim();
    let mut values = Array2::zeros((rows, cols));
    let mut valid = Array2::from_elem((rows, cols), false);
    for t in 0..cols {
        for lv in 0..rows {
            if let (Some(x), Some(y)) = (b.get(lv, t), a.get(lv, t)) {
                if y != 0.0 {
                    values[[lv, t]] = (x - y) / y;
                    valid[[lv, t]] = true;
                }
            }
        }
    }
    MaskedField::from_parts(values, valid)
}

struct SumOverlay<'a> {
    label: &'static str,
    sums: &'a [f64],
    color: RGBColor,
}

fn draw_field_panel<DB, C>(
    area: &DrawingArea<DB, Shift>,
    title: &str,
    field: &MaskedField,
    inversion: &Inversion,
    color: &C,
    overlays: &[SumOverlay<'_>],
    sum_max: f64,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
    C: Fn(f64) -> RGBColor,
{
    let (rows, cols) = field.dim();
    let times = &inversion.emission_times;
    let boundaries = level_boundaries(inversion);

    let title_font = FontDesc::new(FontFamily::SansSerif, 20.0, FontStyle::Bold);
    let label_font = FontDesc::new(FontFamily::SansSerif, 14.0, FontStyle::Normal);

    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .caption(title, title_font)
        .set_label_area_size(LabelAreaPosition::Left, 70)
        .set_label_area_size(LabelAreaPosition::Bottom, 45)
        .build_cartesian_2d(0f64..cols as f64, 0f64..rows as f64)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels((cols / 8).clamp(2, 12))
        .y_labels((rows / 2).clamp(2, 10))
        .x_label_formatter(&|v| time_tick_label(times, *v))
        .y_label_formatter(&|v| boundary_tick_label(&boundaries, *v))
        .y_desc("Elevation (m a.s.l.)")
        .label_style(label_font.clone())
        .draw()?;

    chart.draw_series(field.validity().indexed_iter().filter_map(|((a, t), &ok)| {
        if !ok {
            return None;
        }
        let v = field.values()[[a, t]];
        Some(Rectangle::new(
            [(t as f64, a as f64), (t as f64 + 1.0, a as f64 + 1.0)],
            color(v).filled(),
        ))
    }))?;

    // Emitted-sum overlays share the panel, normalized to its height.
    let scale = rows as f64 / sum_max;
    for overlay in overlays {
        let series: Vec<(f64, f64)> = overlay
            .sums
            .iter()
            .enumerate()
            .map(|(t, &s)| (t as f64 + 0.5, (s * scale).min(rows as f64)))
            .collect();
        chart
            .draw_series(LineSeries::new(
                series.into_iter(),
                overlay.color.stroke_width(2),
            ))?
            .label(overlay.label)
            .legend({
                let color = overlay.color;
                move |(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], color)
            });
    }

    if !overlays.is_empty() {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.7))
            .border_style(BLACK.mix(0.3))
            .label_font(label_font.color(&BLACK))
            .position(SeriesLabelPosition::UpperLeft)
            .draw()?;
    }

    Ok(())
}

fn draw_convergence_panel<DB>(area: &DrawingArea<DB, Shift>, inversion: &Inversion) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let iterations = inversion.convergence.len().max(inversion.residual.len());
    let x_max = iterations.max(1) as f64;
    let conv_max = inversion
        .convergence
        .iter()
        .copied()
        .fold(1.0e-10_f64, f64::max)
        * 1.05;
    let res_max = inversion
        .residual
        .iter()
        .copied()
        .fold(1.0e-10_f64, f64::max)
        * 1.05;

    let title_font = FontDesc::new(FontFamily::SansSerif, 20.0, FontStyle::Bold);
    let label_font = FontDesc::new(FontFamily::SansSerif, 14.0, FontStyle::Normal);

    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .caption("Convergence / residual", title_font)
        .set_label_area_size(LabelAreaPosition::Left, 70)
        .set_label_area_size(LabelAreaPosition::Right, 70)
        .set_label_area_size(LabelAreaPosition::Bottom, 45)
        .build_cartesian_2d(0f64..x_max, 0f64..conv_max)?
        .set_secondary_coord(0f64..x_max, 0f64..res_max);

    chart
        .configure_mesh()
        .x_desc("Iteration")
        .y_desc("Convergence")
        .label_style(label_font.clone())
        .draw()?;
    chart
        .configure_secondary_axes()
        .y_desc("Residual")
        .label_style(label_font.clone())
        .draw()?;

    chart
        .draw_series(LineSeries::new(
            inversion
                .convergence
                .iter()
                .enumerate()
                .map(|(i, &v)| (i as f64, v)),
            RED.stroke_width(2),
        ))?
        .label("Convergence")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], RED));

    chart
        .draw_secondary_series(LineSeries::new(
            inversion
                .residual
                .iter()
                .enumerate()
                .map(|(i, &v)| (i as f64, v)),
            BLUE.stroke_width(2),
        ))?
        .label("Residual")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], BLUE));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.7))
        .border_style(BLACK.mix(0.3))
        .label_font(label_font.color(&BLACK))
        .position(SeriesLabelPosition::UpperRight)
        .draw()?;

    Ok(())
}

fn draw_matrix_figure<DB>(
    root: DrawingArea<DB, Shift>,
    matrix: &Array2<f64>,
    original_dim: (usize, usize),
    vmin: f64,
    vmax: f64,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let (rows, cols) = matrix.dim();
    let title_font = FontDesc::new(FontFamily::SansSerif, 20.0, FontStyle::Bold);
    let label_font = FontDesc::new(FontFamily::SansSerif, 14.0, FontStyle::Normal);

    // Axes keep the original extent so tick labels refer to real indices.
    let (orig_rows, orig_cols) = original_dim;
    let mut chart = ChartBuilder::on(&root)
        .margin(15)
        .caption("Matrix", title_font)
        .set_label_area_size(LabelAreaPosition::Left, 80)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .build_cartesian_2d(0f64..orig_cols as f64, orig_rows as f64..0f64)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Emission number")
        .y_desc("Observation number")
        .label_style(label_font)
        .draw()?;

    let cell_w = orig_cols as f64 / cols as f64;
    let cell_h = orig_rows as f64 / rows as f64;
    chart.draw_series(matrix.indexed_iter().map(|((r, c), &v)| {
        let x0 = c as f64 * cell_w;
        let y0 = r as f64 * cell_h;
        Rectangle::new(
            [(x0, y0), (x0 + cell_w, y0 + cell_h)],
            log_norm_color(v, vmin, vmax).filled(),
        )
    }))?;

    root.present()?;
    Ok(())
}

fn time_tick_label(times: &[DateTime<Utc>], v: f64) -> String {
    let i = v.floor() as usize;
    if v < 0.0 || i >= times.len() {
        return String::new();
    }
    times[i].format("%d %b %H:%M").to_string()
}

fn boundary_tick_label(boundaries: &[f64], v: f64) -> String {
    let i = v.round() as usize;
    if v < -0.5 || i >= boundaries.len() {
        return String::new();
    }
    format!("{:.0}", boundaries[i])
}

// Linear segmented colormaps over the control points used for ash fields.
const DEFAULT_STOPS: &[(f64, RGBColor)] = &[
    (0.0, RGBColor(255, 255, 204)),
    (0.05, RGBColor(0, 255, 0)),
    (0.4, RGBColor(230, 255, 51)),
    (0.6, RGBColor(255, 0, 0)),
    (1.0, RGBColor(153, 51, 255)),
];

const ALTERNATIVE_STOPS: &[(f64, RGBColor)] = &[
    (0.0, RGBColor(255, 255, 153)),
    (0.4, RGBColor(230, 255, 51)),
    (0.6, RGBColor(255, 204, 0)),
    (0.7, RGBColor(255, 102, 0)),
    (0.8, RGBColor(255, 0, 0)),
    (0.9, RGBColor(255, 51, 153)),
    (1.0, RGBColor(153, 51, 255)),
];

const BIRTHE_STOPS: &[(f64, RGBColor)] = &[
    (0.0, RGBColor(255, 255, 255)),
    (4.0 / 35.0, RGBColor(178, 229, 249)),
    (13.0 / 35.0, RGBColor(83, 143, 201)),
    (18.0 / 35.0, RGBColor(71, 181, 76)),
    (25.0 / 35.0, RGBColor(245, 231, 60)),
    (1.0, RGBColor(223, 43, 36)),
];

const STOHL_STOPS: &[(f64, RGBColor)] = &[
    (0.0, RGBColor(255, 255, 255)),
    (0.035, RGBColor(255, 229, 226)),
    (0.06, RGBColor(177, 217, 230)),
    (0.1, RGBColor(152, 232, 168)),
    (0.2, RGBColor(255, 252, 0)),
    (0.5, RGBColor(255, 13, 0)),
    (1.0, RGBColor(145, 0, 0)),
];

impl ColormapOpt {
    fn stops(&self) -> &'static [(f64, RGBColor)] {
        match self {
            ColormapOpt::Default => DEFAULT_STOPS,
            ColormapOpt::Alternative => ALTERNATIVE_STOPS,
            ColormapOpt::Birthe => BIRTHE_STOPS,
            ColormapOpt::Stohl => STOHL_STOPS,
        }
    }
}

fn sample_colormap(stops: &[(f64, RGBColor)], t: f64) -> RGBColor {
    let t = t.clamp(0.0, 1.0);
    let mut prev = stops[0];
    for &stop in stops {
        if t <= stop.0 {
            let (p0, c0) = prev;
            let (p1, c1) = stop;
            let frac = if p1 > p0 { (t - p0) / (p1 - p0) } else { 0.0 };
            return lerp_color(c0, c1, frac);
        }
        prev = stop;
    }
    stops[stops.len() - 1].1
}

/// Two-slope diverging scale: [vmin, 0] maps to blue..white, [0, vmax] to
/// white..red, with the center pinned at zero.
fn diverging_color(v: f64, vmin: f64, vmax: f64) -> RGBColor {
    let blue = RGBColor(0, 0, 255);
    let white = RGBColor(255, 255, 255);
    let red = RGBColor(255, 0, 0);
    if v < 0.0 {
        let frac = (1.0 - v / vmin).clamp(0.0, 1.0);
        lerp_color(blue, white, frac)
    } else {
        let frac = (v / vmax).clamp(0.0, 1.0);
        lerp_color(white, red, frac)
    }
}

fn log_norm_color(v: f64, vmin: f64, vmax: f64) -> RGBColor {
    let t = if vmax > vmin {
        (v.max(vmin).ln() - vmin.ln()) / (vmax.ln() - vmin.ln())
    } else {
        0.0
    };
    sample_colormap(DEFAULT_STOPS, t)
}

fn lerp_color(a: RGBColor, b: RGBColor, t: f64) -> RGBColor {
    let t = t.clamp(0.0, 1.0);
    let mix = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * t).round() as u8;
    RGBColor(mix(a.0, b.0), mix(a.1, b.1), mix(a.2, b.2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colormap_endpoints_and_interpolation() {
        assert_eq!(sample_colormap(DEFAULT_STOPS, 0.0), RGBColor(255, 255, 204));
        assert_eq!(sample_colormap(DEFAULT_STOPS, 1.0), RGBColor(153, 51, 255));
        assert_eq!(sample_colormap(DEFAULT_STOPS, 5.0), RGBColor(153, 51, 255));
        // Halfway between the 0.05 and 0.4 stops.
        let mid = sample_colormap(DEFAULT_STOPS, 0.225);
        assert_eq!(mid, RGBColor(115, 255, 26));
    }

    #[test]
    fn diverging_scale_is_pinned_at_zero() {
        assert_eq!(diverging_color(0.0, -1.0, 2.0), RGBColor(255, 255, 255));
        assert_eq!(diverging_color(-1.0, -1.0, 2.0), RGBColor(0, 0, 255));
        assert_eq!(diverging_color(2.0, -1.0, 2.0), RGBColor(255, 0, 0));
    }

    #[test]
    fn tick_labels_outside_range_are_empty() {
        let boundaries = [1666.0, 2166.0];
        assert_eq!(boundary_tick_label(&boundaries, 0.0), "1666");
        assert_eq!(boundary_tick_label(&boundaries, 5.0), "");
    }
}
