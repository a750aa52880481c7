use std::fmt::Write;

use crate::classifier::{ImageMetadata, Prediction};
use crate::labels::Diagnosis;

const STYLE: &str = r#"
html, body { background-color: #0F1A2B; color: #E8F1FF; font-family: 'Segoe UI', sans-serif; margin: 0; }
main { max-width: 960px; margin: 0 auto; padding: 1rem 2rem; }
h1, h2, h3, h4, a { color: #00BFFF; }
nav { display: flex; gap: 1.5rem; padding: 1rem 2rem; border-bottom: 1px solid #1C2A40; }
.box { background-color: #1C2A40; padding: 1.2rem; border-radius: 12px; margin-top: 20px; }
.columns { display: flex; gap: 1.5rem; flex-wrap: wrap; }
.columns img { max-width: 560px; width: 100%; border-radius: 8px; }
.result-label { font-size: 28px; font-weight: 700; color: #00BFFF; }
.bar { background-color: #112233; border-radius: 6px; height: 28px; overflow: hidden; margin-top: 12px; }
.fill { height: 100%; line-height: 28px; text-align: center; font-weight: bold; color: #0F1A2B;
        background: linear-gradient(90deg, #00C9FF, #92FE9D); }
.chart-row { display: grid; grid-template-columns: 160px 1fr 64px; align-items: center; gap: 0.75rem; margin: 0.5rem 0; }
.chart-bar { height: 22px; border: 1px solid white; }
.notice { color: #AAA; }
.error { color: #FF5252; }
"#;

/// Bar colour per class in label order.
const CLASS_COLORS: [&str; 3] = ["#FF5252", "#4CAF50", "#00BCD4"];

pub(crate) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title} · COVID-19 Chest Scan Classifier</title>
<style>{STYLE}</style>
</head>
<body>
<nav><a href="/">Home</a><a href="/results">Results</a><a href="/about">About</a></nav>
<main>
{body}
</main>
</body>
</html>"#,
        title = escape(title),
    )
}

fn upload_form() -> &'static str {
    r#"<form class="box" action="/predict" method="post" enctype="multipart/form-data">
<label for="file">Upload an image</label>
<input id="file" type="file" name="file" accept=".png,.jpg,.jpeg" required>
<button type="submit">Analyze</button>
</form>"#
}

pub fn home_page() -> String {
    let body = format!(
        r#"<h1 style="text-align:center;">COVID-19 Chest Scan Classifier</h1>
<p style="text-align:center;">Upload a chest X-ray or CT scan to detect COVID-19, Pneumonia, or Normal findings.</p>
{}
<p class="notice">Please upload an image to get a prediction.</p>"#,
        upload_form()
    );
    layout("Home", &body)
}

/// Result view: the uploaded scan, its metadata and the predicted label with a
/// confidence bar.
pub fn result_page(image: &ImageMetadata, preview: Option<&str>, prediction: &Prediction) -> String {
    let mut body = String::new();
    body.push_str("<h1>COVID-19 Chest Scan Classifier</h1>\n<div class=\"columns\">\n");
    if let Some(src) = preview {
        let _ = writeln!(body, r#"<div><img src="{}" alt="Uploaded Image"></div>"#, escape(src));
    }
    let _ = write!(
        body,
        r#"<div class="box"><h3>Image Info</h3>
<p><b>Format</b>: {}</p>
<p><b>Mode</b>: {}</p>
<p><b>Size</b>: {} x {}</p></div>
</div>
"#,
        escape(&image.format),
        escape(&image.mode),
        image.width,
        image.height
    );

    let label = prediction.label.label();
    let _ = write!(
        body,
        r#"<div class="box">
<div class="result-label">Prediction: {label}</div>
<p>This scan is predicted as <b>{label}</b> with a confidence of:</p>
<div class="bar"><div class="fill" style="width: {width:.1}%;">{confidence:.2}%</div></div>
</div>
<p><a href="/results">View class probabilities</a></p>
{form}"#,
        label = label,
        width = prediction.confidence,
        confidence = prediction.confidence,
        form = upload_form(),
    );
    layout("Prediction", &body)
}

/// Chart view: one horizontal bar per class, width proportional to its probability.
pub fn chart_page(prediction: Option<&Prediction>) -> String {
    let mut body = String::from("<h2>Class Probabilities</h2>\n");
    match prediction {
        Some(prediction) => {
            body.push_str("<div class=\"box\">\n");
            for ((class, probability), color) in prediction.scores().zip(CLASS_COLORS) {
                let _ = writeln!(
                    body,
                    r#"<div class="chart-row"><span>{}</span><div class="chart-bar" style="width: {:.1}%; background-color: {};"></div><span>{:.1}%</span></div>"#,
                    class.label(),
                    probability * 100.0,
                    color,
                    probability * 100.0
                );
            }
            body.push_str("</div>\n");
        }
        None => {
            body.push_str(
                "<p class=\"notice\">No predictions yet. Go to the <a href=\"/\">Home</a> page to upload an image.</p>\n",
            );
        }
    }
    layout("Results", &body)
}

pub fn about_page(input_width: u32, input_height: u32) -> String {
    let mut classes = String::new();
    for class in Diagnosis::ALL {
        let _ = writeln!(classes, "<li>{}</li>", class.label());
    }
    let body = format!(
        r#"<div class="box">
<h3>About This App</h3>
<p>This app uses a deep learning CNN model to classify chest X-rays into:</p>
<ul>
{classes}</ul>
<h4>Model Info</h4>
<ul>
<li><b>Model:</b> CNN (ONNX)</li>
<li><b>Input:</b> {input_width}x{input_height} RGB</li>
<li><b>Runtime:</b> ONNX Runtime</li>
</ul>
<p class="notice">Disclaimer: For educational use only, not a certified diagnostic tool.</p>
</div>"#
    );
    layout("About", &body)
}

pub fn error_page(message: &str) -> String {
    let body = format!(
        "<h2>Could not analyze this file</h2>\n<p class=\"error\">{}</p>\n<p>Please upload a new image.</p>\n{}",
        escape(message),
        upload_form()
    );
    layout("Error", &body)
}
