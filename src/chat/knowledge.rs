//! Offline knowledge matcher.
//!
//! Deterministic keyword-scored fallback answer engine used without network
//! access. Each keyword found in the input contributes its length, plus a
//! fixed bonus when it appears as a whole word, so longer and more specific
//! phrases outweigh short ones. The table is static for the session and
//! never mutated by matching.

use serde::{Deserialize, Serialize};

use super::types::Language;

/// Bonus for a whole-word occurrence over a bare substring hit.
const WHOLE_WORD_BONUS: usize = 5;

const FALLBACK_EN: &str = "I can only answer study-related questions while offline. \
     Please try again when you are back online.";
const FALLBACK_ES: &str = "Sin conexión solo puedo responder preguntas relacionadas con el \
     estudio. Inténtalo de nuevo cuando vuelvas a estar en línea.";

/// An answer in both interface languages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalizedAnswer {
    pub en: String,
    pub es: String,
}

impl LocalizedAnswer {
    pub fn new(en: impl Into<String>, es: impl Into<String>) -> Self {
        Self {
            en: en.into(),
            es: es.into(),
        }
    }

    pub fn text(&self, language: Language) -> &str {
        match language {
            Language::En => &self.en,
            Language::Es => &self.es,
        }
    }
}

/// One entry in the knowledge base: keyword-scored, or the default answer
/// returned when nothing scores above zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum KnowledgeEntry {
    Keyed {
        keywords: Vec<String>,
        answer: LocalizedAnswer,
    },
    Default {
        answer: LocalizedAnswer,
    },
}

impl KnowledgeEntry {
    pub fn keyed(keywords: &[&str], answer: LocalizedAnswer) -> Self {
        Self::Keyed {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            answer,
        }
    }
}

/// Static question/keyword/answer table with scored matching.
pub struct KnowledgeBase {
    entries: Vec<KnowledgeEntry>,
}

impl KnowledgeBase {
    pub fn new(entries: Vec<KnowledgeEntry>) -> Self {
        Self { entries }
    }

    /// The built-in bilingual learning-domain table.
    pub fn built_in() -> Self {
        Self::new(vec![
            KnowledgeEntry::keyed(
                &["study tips", "how to study", "study plan"],
                LocalizedAnswer::new(
                    "Break your study time into short focused sessions, review each chapter \
                     summary right after finishing it, and retake quizzes on anything you \
                     scored below 70% on.",
                    "Divide tu tiempo de estudio en sesiones cortas y enfocadas, repasa el \
                     resumen de cada capítulo al terminarlo y repite los cuestionarios en los \
                     que hayas sacado menos del 70%.",
                ),
            ),
            KnowledgeEntry::keyed(
                &["exam", "exam tips", "test preparation"],
                LocalizedAnswer::new(
                    "Before an exam, redo the practice quizzes for every chapter and focus on \
                     the questions you missed. Your progress page shows which chapters still \
                     need review.",
                    "Antes de un examen, repite los cuestionarios de práctica de cada capítulo \
                     y céntrate en las preguntas que fallaste. Tu página de progreso muestra \
                     qué capítulos aún necesitas repasar.",
                ),
            ),
            KnowledgeEntry::keyed(
                &["career", "job", "profession"],
                LocalizedAnswer::new(
                    "Completing all chapters earns you a certificate you can attach to job \
                     applications. The career guidance section lists roles that match each \
                     course track.",
                    "Al completar todos los capítulos obtienes un certificado que puedes \
                     adjuntar a tus solicitudes de empleo. La sección de orientación \
                     profesional muestra los puestos que corresponden a cada itinerario.",
                ),
            ),
            KnowledgeEntry::keyed(
                &["quiz", "score", "grade"],
                LocalizedAnswer::new(
                    "Quiz scores are saved locally and uploaded automatically the next time \
                     you are online, so you can keep working through quizzes offline.",
                    "Las puntuaciones de los cuestionarios se guardan localmente y se suben \
                     automáticamente la próxima vez que estés en línea, así que puedes seguir \
                     haciendo cuestionarios sin conexión.",
                ),
            ),
            KnowledgeEntry::keyed(
                &["offline", "no internet", "connection"],
                LocalizedAnswer::new(
                    "You can read downloaded lessons, take quizzes, and track progress \
                     offline. Everything syncs automatically once your connection returns.",
                    "Puedes leer las lecciones descargadas, hacer cuestionarios y registrar tu \
                     progreso sin conexión. Todo se sincroniza automáticamente cuando vuelve \
                     la conexión.",
                ),
            ),
            KnowledgeEntry::keyed(
                &["hello", "hi", "hola"],
                LocalizedAnswer::new(
                    "Hello! I'm your study assistant. Ask me about studying, exams, quizzes, \
                     or career guidance.",
                    "¡Hola! Soy tu asistente de estudio. Pregúntame sobre el estudio, los \
                     exámenes, los cuestionarios o la orientación profesional.",
                ),
            ),
            KnowledgeEntry::Default {
                answer: LocalizedAnswer::new(FALLBACK_EN, FALLBACK_ES),
            },
        ])
    }

    /// Best-matching answer for the input, in the requested language.
    ///
    /// Pure function of its inputs and the table: identical input always
    /// returns the identical answer. Ties break toward the entry declared
    /// first.
    pub fn answer(&self, user_text: &str, language: Language) -> &str {
        let input = user_text.to_lowercase();

        let mut best: Option<(usize, &LocalizedAnswer)> = None;
        for entry in &self.entries {
            let KnowledgeEntry::Keyed { keywords, answer } = entry else {
                continue;
            };
            let score: usize = keywords
                .iter()
                .map(|k| keyword_score(&input, &k.to_lowercase()))
                .sum();
            if score > 0 && best.map_or(true, |(top, _)| score > top) {
                best = Some((score, answer));
            }
        }

        match best {
            Some((_, answer)) => answer.text(language),
            None => self.default_answer(language),
        }
    }

    fn default_answer(&self, language: Language) -> &str {
        self.entries
            .iter()
            .find_map(|entry| match entry {
                KnowledgeEntry::Default { answer } => Some(answer.text(language)),
                _ => None,
            })
            .unwrap_or(match language {
                Language::En => FALLBACK_EN,
                Language::Es => FALLBACK_ES,
            })
    }
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::built_in()
    }
}

fn keyword_score(input: &str, keyword: &str) -> usize {
    if keyword.is_empty() || !input.contains(keyword) {
        return 0;
    }
    let mut score = keyword.len();
    if has_whole_word(input, keyword) {
        score += WHOLE_WORD_BONUS;
    }
    score
}

/// Whether the keyword occurs with non-alphanumeric (or string) boundaries
/// on both sides.
fn has_whole_word(input: &str, keyword: &str) -> bool {
    let mut search_from = 0;
    while let Some(found) = input[search_from..].find(keyword) {
        let at = search_from + found;
        let end = at + keyword.len();
        let before_ok = input[..at]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = input[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        search_from = end;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(entries: &[(&[&str], &str)]) -> KnowledgeBase {
        KnowledgeBase::new(
            entries
                .iter()
                .map(|(keywords, answer)| {
                    KnowledgeEntry::keyed(keywords, LocalizedAnswer::new(*answer, *answer))
                })
                .collect(),
        )
    }

    #[test]
    fn test_longer_phrase_outranks_short_keyword() {
        let kb = base(&[(&["exam"], "short"), (&["exam tips"], "specific")]);
        assert_eq!(kb.answer("give me exam tips", Language::En), "specific");
    }

    #[test]
    fn test_deterministic() {
        let kb = KnowledgeBase::built_in();
        let a = kb.answer("how should I prepare for my exam?", Language::En);
        let b = kb.answer("how should I prepare for my exam?", Language::En);
        assert_eq!(a, b);
    }

    #[test]
    fn test_tie_breaks_to_first_declared() {
        let kb = base(&[(&["abc"], "first"), (&["abc"], "second")]);
        assert_eq!(kb.answer("abc", Language::En), "first");
    }

    #[test]
    fn test_whole_word_bonus_outweighs_bare_substring() {
        let kb = base(&[(&["cloud"], "cloud"), (&["loud"], "loud")]);
        // "loud" appears as a whole word but "cloud" only inside "clouds",
        // so the bonus flips the raw length ordering
        assert_eq!(kb.answer("so loud clouds", Language::En), "loud");
    }

    #[test]
    fn test_no_match_returns_default() {
        let kb = KnowledgeBase::built_in();
        let answer = kb.answer("completely unrelated gibberish xyzzy", Language::En);
        assert_eq!(answer, FALLBACK_EN);
    }

    #[test]
    fn test_career_question_answered_bilingually() {
        let kb = KnowledgeBase::built_in();
        let en = kb.answer("what about my career?", Language::En);
        assert!(en.contains("certificate"));
        let es = kb.answer("what about my career?", Language::Es);
        assert!(es.contains("certificado"));
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let kb = base(&[(&["exam"], "match")]);
        assert_eq!(kb.answer("EXAM TOMORROW", Language::En), "match");
    }

    #[test]
    fn test_default_entry_in_table_wins_over_builtin_fallback() {
        let kb = KnowledgeBase::new(vec![KnowledgeEntry::Default {
            answer: LocalizedAnswer::new("custom default", "predeterminado"),
        }]);
        assert_eq!(kb.answer("anything", Language::En), "custom default");
        assert_eq!(kb.answer("anything", Language::Es), "predeterminado");
    }
}
