//! Plot Marker demo shell.
//!
//! Serves a local image folder through the in-memory backend with a
//! synthetic straight-line GPS track, and drives a [`Session`] from stdin.

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use plot_marker::crop::{CropState, ImageLayout};
use plot_marker::folder::list_image_files;
use plot_marker::model::{DirectoryKey, LatLon, StitchDirection};
use plot_marker::registry::{SortKey, SortOrder};
use plot_marker::segmentation::SegmentState;
use plot_marker::{AppConfig, FieldService, MarkEnd, MemoryService, NoticeLevel, Session};
use web_time::Instant;

const USAGE: &str = "usage: plot-marker <image-folder> [year/experiment/location/population/date/platform/sensor[/camera]]";

const HELP: &str = "\
commands:
  next | prev                 step one image
  jump [back]                 skip ahead (or back) by the jump step
  goto <index|image>          move the cursor
  start                       mark plot start at the current image
  end [up|down|left|right]    mark plot end
  dir <up|down|left|right>    answer the direction prompt
  cancel                      drop the marked start (or the prompt)
  ref | shift | undo          GPS reference, shift, undo shift
  plots [index|label|accession] [asc|desc]
  delete <plot>               delete a marked plot
  crop <width> <height>       open the crop editor on a WxH image
  crop move <dx> <dy> | crop confirm | crop back | crop save | crop cancel
  quit";

/// Synthetic track origin for demo folders
const DEMO_LAT: f64 = 38.5382;
const DEMO_LON: f64 = -121.7617;
/// Latitude step between consecutive demo images
const DEMO_STEP_DEG: f64 = 1e-5;

/// Rendered width of the image assumed by the crop commands
const DEMO_RENDER_WIDTH: f64 = 800.0;

const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

enum Flow {
    Continue,
    Quit,
}

fn main() {
    let loaded = AppConfig::load_from_default_path();
    let first_run = loaded.is_none();
    let config = loaded.unwrap_or_default();
    env_logger::Builder::new()
        .filter_level(config.log_level.to_level_filter())
        .parse_default_env()
        .init();
    if first_run {
        write_default_config(&config);
    }

    if let Err(e) = run(config) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(config: AppConfig) -> Result<(), String> {
    let mut args = std::env::args().skip(1);
    let folder = args.next().ok_or(USAGE)?;
    let folder = Path::new(&folder);
    let dir = match args.next() {
        Some(path) => DirectoryKey::parse(&path)
            .ok_or_else(|| format!("Invalid directory path '{}'\n{}", path, USAGE))?,
        None => demo_directory(folder),
    };

    let images =
        list_image_files(folder).map_err(|e| format!("Failed to read {:?}: {}", folder, e))?;
    if images.is_empty() {
        return Err(format!("No images found in {:?}", folder));
    }
    let positions = (0..images.len())
        .map(|i| LatLon::new(DEMO_LAT + i as f64 * DEMO_STEP_DEG, DEMO_LON))
        .collect();

    let backend = MemoryService::new();
    backend.add_directory(dir.clone(), images, positions);
    let service: Arc<dyn FieldService> = Arc::new(backend);

    let mut session =
        Session::new(service, config.to_session_config()).map_err(|e| e.to_string())?;
    session.open_directory(dir).map_err(|e| e.to_string())?;
    session.run_until_idle(IDLE_TIMEOUT);
    println!("{}", HELP);
    print_status(&session);

    let stdin = io::stdin();
    prompt();
    for line in stdin.lock().lines() {
        let line = line.map_err(|e| e.to_string())?;
        let words: Vec<&str> = line.split_whitespace().collect();
        if let Some((command, args)) = words.split_first() {
            if let Flow::Quit = execute(&mut session, command, args) {
                break;
            }
            session.run_until_idle(IDLE_TIMEOUT);
            for notice in session.take_notices() {
                match notice.level {
                    NoticeLevel::Info => println!("  {}", notice.message),
                    NoticeLevel::Warning => println!("  ! {}", notice.message),
                }
            }
            print_status(&session);
        }
        prompt();
    }
    Ok(())
}

/// Store the defaults so they can be edited. An unreadable existing file is
/// left alone.
fn write_default_config(config: &AppConfig) {
    let Some(path) = AppConfig::default_path() else {
        return;
    };
    if path.exists() {
        return;
    }
    if let Err(e) = config.save_to_default_path() {
        log::warn!("Could not write default configuration: {}", e);
    }
}

/// Directory key for a folder given without one.
fn demo_directory(folder: &Path) -> DirectoryKey {
    let name = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "images".to_string());
    DirectoryKey::new("demo", "demo", "local", name, "today", "rover", "rgb")
}

fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}

fn print_status(session: &Session) {
    let nav = session.navigator();
    let image = nav.visual_image().unwrap_or("-");
    let plot = session
        .current_membership()
        .and_then(|m| m.plot_index)
        .map_or_else(|| "-".to_string(), |p| p.to_string());
    let position = session
        .current_position()
        .map_or_else(|| "?".to_string(), |p| format!("{:.6}, {:.6}", p.lat, p.lon));
    println!(
        "[{}/{}] {}  plot {}  at ({})  {}{}",
        nav.visual_index() + 1,
        nav.len(),
        image,
        plot,
        position,
        session.segmentation().state().name(),
        if session.gps().has_shift() { "  (shifted)" } else { "" }
    );
}

fn execute(session: &mut Session, command: &str, args: &[&str]) -> Flow {
    let now = Instant::now();
    match command {
        "next" | "n" => session.next_image(now),
        "prev" | "p" => session.prev_image(now),
        "jump" | "j" => match args.first() {
            Some(&"back") => session.jump_back(now),
            _ => session.jump_forward(now),
        },
        "goto" | "g" => match args.first() {
            Some(target) => match target.parse::<isize>() {
                Ok(index) => session.set_visual_index(index - 1, now),
                Err(_) => {
                    if !session.seek_to_image(target, now) {
                        println!("  no image named {}", target);
                    }
                }
            },
            None => println!("  goto <index|image>"),
        },
        "start" => {
            let _ = session.mark_start();
        }
        "end" => {
            let direction = match args.first().map(|d| d.parse::<StitchDirection>()) {
                Some(Ok(direction)) => Some(direction),
                Some(Err(e)) => {
                    println!("  {}", e);
                    return Flow::Continue;
                }
                None => None,
            };
            if let Ok(MarkEnd::NeedsDirection) = session.mark_end(direction) {
                println!("  choose a stitch direction: dir up|down|left|right");
            }
        }
        "dir" => match args.first().map(|d| d.parse::<StitchDirection>()) {
            Some(Ok(direction)) => {
                let _ = session.choose_direction(direction);
            }
            Some(Err(e)) => println!("  {}", e),
            None => println!("  dir up|down|left|right"),
        },
        "cancel" => {
            let prompting = matches!(
                session.segmentation().state(),
                SegmentState::SelectingDirection { .. }
            );
            let _ = if prompting {
                session.dismiss_direction()
            } else {
                session.cancel_segment()
            };
        }
        "ref" => {
            if let Ok(reference) = session.mark_reference() {
                println!("  reference ({:.7}, {:.7})", reference.lat, reference.lon);
            }
        }
        "shift" => {
            let _ = session.apply_shift();
        }
        "undo" => {
            let _ = session.undo_shift();
        }
        "plots" => list_plots(session, args),
        "delete" => match args.first().and_then(|p| p.parse::<u32>().ok()) {
            Some(plot_index) => {
                let _ = session.delete_plot(plot_index);
            }
            None => println!("  delete <plot>"),
        },
        "crop" => crop(session, args),
        "help" | "?" => println!("{}", HELP),
        "quit" | "q" | "exit" => return Flow::Quit,
        other => println!("  unknown command '{}', try help", other),
    }
    Flow::Continue
}

fn list_plots(session: &Session, args: &[&str]) {
    let key = args
        .first()
        .and_then(|k| k.parse::<SortKey>().ok())
        .unwrap_or_default();
    let order = args
        .get(1)
        .and_then(|o| o.parse::<SortOrder>().ok())
        .unwrap_or_default();
    let plots = session.list_plots(key, order);
    if plots.is_empty() {
        println!("  no plots marked");
    }
    for plot in plots {
        println!(
            "  {:>4}  {} -> {}  {:<5}  {}  {}",
            plot.plot_index,
            plot.start_image,
            plot.end_image,
            plot.stitch_direction,
            plot.plot_label.as_deref().unwrap_or("-"),
            plot.accession.as_deref().unwrap_or("-"),
        );
    }
}

fn crop(session: &mut Session, args: &[&str]) {
    let number = |i: usize| args.get(i).and_then(|v| v.parse::<f64>().ok());
    match args.first().copied() {
        Some("move") => match (number(1), number(2)) {
            (Some(dx), Some(dy)) => {
                if let Err(e) = session.crop_mut().drag_move(dx, dy) {
                    println!("  ! {}", e);
                }
            }
            _ => println!("  crop move <dx> <dy>"),
        },
        Some("confirm") => {
            if let Ok(mask) = session.confirm_crop() {
                println!(
                    "  mask left {} right {} top {} bottom {}",
                    mask.left, mask.right, mask.top, mask.bottom
                );
                if let CropState::Confirming { layout, .. } = session.crop().state() {
                    let (width, height) =
                        mask.kept_size(layout.natural_width, layout.natural_height);
                    println!(
                        "  keeps {}x{} px; crop save to store it, crop back to adjust",
                        width, height
                    );
                }
            }
        }
        Some("back") => {
            let _ = session.back_to_edit();
        }
        Some("save") => {
            let _ = session.save_crop();
        }
        Some("cancel") => session.cancel_crop(),
        _ => match (number(0), number(1)) {
            (Some(width), Some(height)) if width > 0.0 && height > 0.0 => {
                let scale = DEMO_RENDER_WIDTH / width;
                let layout = ImageLayout::new(
                    0.0,
                    0.0,
                    DEMO_RENDER_WIDTH,
                    height * scale,
                    width as u32,
                    height as u32,
                );
                if session.begin_crop(layout).is_ok() {
                    if let Some(rect) = session.crop().crop_box() {
                        println!(
                            "  box ({:.0}, {:.0}) {:.0}x{:.0} on {:.0}x{:.0} display px",
                            rect.left,
                            rect.top,
                            rect.width(),
                            rect.height(),
                            layout.rendered_width,
                            layout.rendered_height
                        );
                    }
                }
            }
            _ => println!("  crop <width> <height>"),
        },
    }
}
