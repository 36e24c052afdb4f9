use crate::mapper::DiagnosisResult;

/// What the page shows below the upload form.
pub struct PredictionView<'a> {
    pub result: &'a DiagnosisResult,
    pub image_path: &'a str,
}

/// URL under which a stored upload is served.
pub fn static_path(file_name: &str) -> String {
    format!("/static/{}", urlencoding::encode(file_name))
}

pub fn index_page(prediction: Option<&PredictionView<'_>>) -> String {
    let result_section = prediction.map(result_section).unwrap_or_default();
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Cattle Lumpy Skin Disease Detection</title>
</head>
<body>
  <h1>Cattle Lumpy Skin Disease Detection</h1>
  <form action="/predict" method="post" enctype="multipart/form-data">
    <input type="file" name="file" accept="image/*">
    <button type="submit">Predict</button>
  </form>
{result_section}</body>
</html>
"#
    )
}

fn result_section(view: &PredictionView<'_>) -> String {
    let class = if view.result.diagnosis.is_healthy() {
        "healthy"
    } else {
        "diseased"
    };
    format!(
        r#"  <section class="result {class}">
    <h2>{label}</h2>
    <p>{treatment}</p>
    <img src="{image}" alt="Uploaded image" width="300">
  </section>
"#,
        label = escape_html(view.result.label()),
        treatment = escape_html(view.result.treatment()),
        image = escape_html(view.image_path),
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::PredictionVector;
    use crate::mapper::map_prediction;

    #[test]
    fn form_posts_file_field_to_predict() {
        let page = index_page(None);
        assert!(page.contains(r#"action="/predict""#));
        assert!(page.contains(r#"name="file""#));
        assert!(!page.contains("<section"));
    }

    #[test]
    fn result_embeds_label_treatment_and_image() {
        let result = map_prediction(&PredictionVector::new(vec![0.1, 0.9])).unwrap();
        let image_path = static_path("cow 1.jpg");
        let page = index_page(Some(&PredictionView {
            result: &result,
            image_path: &image_path,
        }));

        assert!(page.contains("Lumpy Disease Detected"));
        assert!(page.contains("Isolate the infected cow."));
        assert!(page.contains(r#"src="/static/cow%201.jpg""#));
        assert!(page.contains(r#"class="result diseased""#));
    }

    #[test]
    fn markup_in_names_is_escaped() {
        assert_eq!(escape_html(r#"<img src="x">"#), "&lt;img src=&quot;x&quot;&gt;");
        assert_eq!(static_path("a<b>.png"), "/static/a%3Cb%3E.png");
    }
}
