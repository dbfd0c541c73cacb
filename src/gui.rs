//! Desktop front end, compiled only with the `gui` feature.
//!
//! One window, two image panels and an info area. The pipeline is built by
//! the caller and runs on the GTK main thread when the Run Program button is
//! pressed; images are display copies scaled to fit, the full-size annotated
//! result stays untouched.

use gtk::prelude::*;
use gtk::{Image, ImageExt, MessageDialog};
use gdk_pixbuf::{Colorspace, InterpType, Pixbuf};
use gio::prelude::*;

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use image::{DynamicImage, RgbImage};

use crate::Pipeline;

const APP_ID: &str = "org.plate-vision.viewer";
const BITS_PER_SAMPLE: i32 = 8;
const DISPLAY_MAX: i32 = 450;

struct AppState {
    pipeline: Pipeline,
    image_path: Option<PathBuf>,
    original: Option<DynamicImage>,
}

/// Run the viewer until its window closes.
pub fn run(pipeline: Pipeline) {
    let uiapp = gtk::Application::new(Some(APP_ID), gio::ApplicationFlags::FLAGS_NONE)
        .expect("Application::new failed");
    let state = Rc::new(RefCell::new(AppState {
        pipeline,
        image_path: None,
        original: None,
    }));
    uiapp.connect_activate(move |app| {
        build_window(app, state.clone());
    });
    // Our own flags are consumed before gtk starts, so gtk gets none.
    uiapp.run(&[]);
}

fn build_window(app: &gtk::Application, state: Rc<RefCell<AppState>>) {
    let win = gtk::ApplicationWindow::new(app);
    win.set_title("License Plate Detector");
    win.set_default_size(1000, 700);

    let vbox = gtk::Box::new(gtk::Orientation::Vertical, 10);

    let controls = gtk::Box::new(gtk::Orientation::Horizontal, 20);
    let btn_load = gtk::Button::new_with_label("Load Image");
    let btn_run = gtk::Button::new_with_label("Run Program");
    controls.pack_start(&btn_load, false, false, 20);
    controls.pack_start(&btn_run, false, false, 20);
    vbox.pack_start(&controls, false, false, 10);

    let content = gtk::Box::new(gtk::Orientation::Horizontal, 10);
    let original_panel = gtk::Frame::new(Some("Original Image"));
    let original_view = Image::new();
    original_panel.add(&original_view);
    let processed_panel = gtk::Frame::new(Some("Processed Image"));
    let processed_view = Image::new();
    processed_panel.add(&processed_view);
    content.pack_start(&original_panel, true, true, 5);
    content.pack_start(&processed_panel, true, true, 5);
    vbox.pack_start(&content, true, true, 10);

    let info = gtk::Box::new(gtk::Orientation::Vertical, 5);
    let info_title = gtk::Label::new(None);
    info_title.set_markup("<b>Detection Info:</b>");
    info_title.set_halign(gtk::Align::Start);
    let time_label = gtk::Label::new(Some("Processing Time: N/A"));
    time_label.set_halign(gtk::Align::Start);
    let coords_view = gtk::TextView::new();
    coords_view.set_editable(false);
    coords_view.set_size_request(-1, 120);
    set_text(&coords_view, "Coordinates will appear here...");
    info.pack_start(&info_title, false, false, 0);
    info.pack_start(&time_label, false, false, 0);
    info.pack_start(&coords_view, false, false, 5);
    vbox.pack_start(&info, false, false, 10);

    win.add(&vbox);

    {
        let state = state.clone();
        let win = win.clone();
        let original_view = original_view.clone();
        let processed_view = processed_view.clone();
        let time_label = time_label.clone();
        let coords_view = coords_view.clone();
        btn_load.connect_clicked(move |_| {
            let path = match pick_image(&win) {
                Some(path) => path,
                None => return,
            };
            match image::open(&path) {
                Ok(img) => {
                    original_view.set_from_pixbuf(display_pixbuf(&img.to_rgb8()).as_ref());
                    processed_view.set_from_pixbuf(None);
                    time_label.set_text("Processing Time: N/A");
                    set_text(&coords_view, "Ready to detect.");
                    let mut st = state.borrow_mut();
                    st.image_path = Some(path);
                    st.original = Some(img);
                }
                Err(err) => {
                    show_message(
                        &win,
                        gtk::MessageType::Error,
                        &format!("Could not load image: {}", err),
                    );
                }
            }
        });
    }

    {
        let state = state.clone();
        let win = win.clone();
        btn_run.connect_clicked(move |_| {
            let original = state.borrow().original.clone();
            let original = match original {
                Some(img) => img,
                None => {
                    show_message(
                        &win,
                        gtk::MessageType::Warning,
                        "Please load an image first.",
                    );
                    return;
                }
            };

            let outcome = state.borrow_mut().pipeline.process(&original);
            match outcome {
                Ok(outcome) => {
                    processed_view.set_from_pixbuf(display_pixbuf(&outcome.annotated).as_ref());
                    time_label.set_text(&format!(
                        "Processing Time: {:.4} seconds",
                        outcome.elapsed.as_secs_f64()
                    ));
                    if outcome.readings.is_empty() {
                        set_text(&coords_view, "No plates detected.");
                    } else {
                        let lines: Vec<String> = outcome
                            .readings
                            .iter()
                            .map(|r| {
                                let mut line = format!(
                                    "Label: {}, Conf: {:.2}, Box: {}",
                                    r.detection.class_name, r.detection.confidence, r.detection.bbox
                                );
                                if !r.text.is_empty() {
                                    line.push_str(&format!(", Text: {}", r.text));
                                }
                                line
                            })
                            .collect();
                        set_text(&coords_view, &lines.join("\n"));
                    }
                }
                Err(err) => {
                    show_message(
                        &win,
                        gtk::MessageType::Error,
                        &format!("Detection failed: {}", err),
                    );
                }
            }
        });
    }

    win.show_all();
}

fn pick_image(win: &gtk::ApplicationWindow) -> Option<PathBuf> {
    let dialog = gtk::FileChooserDialog::new(
        Some("Load Image"),
        Some(win),
        gtk::FileChooserAction::Open,
    );
    dialog.add_buttons(&[
        ("Open", gtk::ResponseType::Ok),
        ("Cancel", gtk::ResponseType::Cancel),
    ]);
    let filter = gtk::FileFilter::new();
    filter.set_name(Some("Image Files"));
    filter.add_pattern("*.jpg");
    filter.add_pattern("*.jpeg");
    filter.add_pattern("*.png");
    filter.add_pattern("*.bmp");
    dialog.add_filter(&filter);

    let path = if dialog.run() == gtk::ResponseType::Ok {
        dialog.get_filename()
    } else {
        None
    };
    dialog.destroy();
    path
}

fn show_message(win: &gtk::ApplicationWindow, kind: gtk::MessageType, text: &str) {
    let dialog = MessageDialog::new(
        Some(win),
        gtk::DialogFlags::MODAL,
        kind,
        gtk::ButtonsType::Ok,
        text,
    );
    dialog.run();
    dialog.destroy();
}

fn set_text(view: &gtk::TextView, text: &str) {
    if let Some(buffer) = view.get_buffer() {
        buffer.set_text(text);
    }
}

/// Display copy scaled to fit `DISPLAY_MAX` on its longer side, never
/// upscaled.
fn display_pixbuf(img: &RgbImage) -> Option<Pixbuf> {
    let width = img.width() as i32;
    let height = img.height() as i32;
    // Tightly packed rgb rows.
    let rowstride = width * 3;
    let pixbuf = Pixbuf::new_from_mut_slice(
        img.to_vec(),
        Colorspace::Rgb,
        false,
        BITS_PER_SAMPLE,
        width,
        height,
        rowstride,
    );
    if width <= DISPLAY_MAX && height <= DISPLAY_MAX {
        return Some(pixbuf);
    }
    let scale = (DISPLAY_MAX as f32 / width as f32).min(DISPLAY_MAX as f32 / height as f32);
    let scaled_w = ((width as f32 * scale) as i32).max(1);
    let scaled_h = ((height as f32 * scale) as i32).max(1);
    pixbuf.scale_simple(scaled_w, scaled_h, InterpType::Bilinear)
}
