use crate::core::models::ExampleSentence;

const PARTICLES: [&str; 8] = ["は", "が", "を", "に", "で", "と", "から", "まで"];

/// Higher is better: moderate length, contains the headword, punctuated, uses common particles.
pub fn score_example(sentence: &str, headword: &str) -> f64 {
    let mut score = 0.0;

    let length = sentence.chars().count();
    if (10..=50).contains(&length) {
        score += 1.0;
    } else if (5..=80).contains(&length) {
        score += 0.5;
    }

    if !headword.is_empty() && sentence.contains(headword) {
        score += 2.0;
    }

    if sentence.contains(['。', '！', '？']) {
        score += 0.5;
    }

    let particles = PARTICLES.iter().filter(|p| sentence.contains(*p)).count();
    score += (particles as f64 * 0.2).min(1.0);

    score
}

/// Best first; ties keep their original order.
pub fn rank_examples(mut examples: Vec<ExampleSentence>, headword: &str) -> Vec<ExampleSentence> {
    examples.sort_by(|a, b| {
        score_example(&b.japanese, headword).total_cmp(&score_example(&a.japanese, headword))
    });
    examples
}
