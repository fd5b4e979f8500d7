//! Tests for message parsing

#[cfg(test)]
mod tests {
    use super::super::*;

    fn parse(raw: &str) -> Vec<Segment> {
        parse_message(raw).into_value()
    }

    #[test]
    fn test_short_form_list() {
        let segments = parse("[{chime: 'bell.mp3'}, {tts: 'Hello'}, {delay: 500}]");
        assert_eq!(
            segments,
            vec![Segment::chime("bell.mp3"), Segment::tts("Hello"), Segment::delay(500.0)]
        );
    }

    #[test]
    fn test_long_form_list_with_quoted_keys() {
        let outcome = parse_message(r#"[{"type": "chime", "path": "ding"}, {"type": "tts", "message": "Dinner is ready"}]"#);
        assert!(!outcome.is_degraded());
        assert_eq!(
            outcome.into_value(),
            vec![Segment::chime("ding"), Segment::tts("Dinner is ready")]
        );
    }

    #[test]
    fn test_empty_and_none_messages() {
        assert!(parse("").is_empty());
        assert!(parse("None").is_empty());
    }

    #[test]
    fn test_plain_text_becomes_single_tts_segment() {
        let outcome = parse_message("The washing machine has finished");
        assert!(!outcome.is_degraded());
        assert_eq!(
            outcome.into_value(),
            vec![Segment::tts("The washing machine has finished")]
        );
    }

    #[test]
    fn test_invalid_entry_falls_back_to_whole_message() {
        let raw = "[{chime: 'bell.mp3'}, {volume: 3}]";
        let outcome = parse_message(raw);
        assert!(outcome.is_degraded());
        assert!(matches!(
            outcome.diagnostics()[0],
            ParseIssue::InvalidEntry { index: 1, .. }
        ));
        assert_eq!(outcome.into_value(), vec![Segment::tts(raw)]);
    }

    #[test]
    fn test_mixed_short_form_keys_are_rejected() {
        let raw = "[{chime: 'bell.mp3', tts: 'Hello'}]";
        assert_eq!(parse(raw), vec![Segment::tts(raw)]);
    }

    #[test]
    fn test_unknown_explicit_type_is_rejected() {
        let raw = "[{type: 'music', path: 'song.mp3'}]";
        assert_eq!(parse(raw), vec![Segment::tts(raw)]);
    }

    #[test]
    fn test_structured_text_that_is_not_a_list() {
        let outcome = parse_message("tts: hello there");
        assert_eq!(outcome.diagnostics(), &[ParseIssue::NotAList]);
        assert_eq!(outcome.into_value(), vec![Segment::tts("tts: hello there")]);
    }

    #[test]
    fn test_repeat_expands_into_adjacent_copies() {
        let segments = parse("[{chime: 'bell.mp3', repeat: 3}, {tts: 'Hello'}]");
        assert_eq!(segments.len(), 4);
        for segment in &segments[..3] {
            assert_eq!(segment.payload, SegmentPayload::Chime { path: "bell.mp3".to_string() });
            assert_eq!(segment.repeat_count, 1);
        }
        assert_eq!(segments[3].kind(), SegmentKind::Tts);
    }

    #[test]
    fn test_non_integer_repeat_counts_once() {
        assert_eq!(parse("[{tts: 'Hi', repeat: 'twice'}]").len(), 1);
        assert_eq!(parse("[{tts: 'Hi', repeat: 0}]").len(), 1);
        assert_eq!(parse("[{tts: 'Hi', repeat: -4}]").len(), 1);
    }

    #[test]
    fn test_huge_repeat_is_capped() {
        let segments = parse("[{tts: 'Hi', repeat: 4000000000}]");
        assert_eq!(segments.len(), MAX_REPEAT as usize);
    }

    #[test]
    fn test_nested_options_reach_the_segment() {
        let segments = parse("[{tts: 'Hello', options: {Voice: 'Brian', Language: 'en', rate: 2}}]");
        assert_eq!(segments.len(), 1);
        let options = &segments[0].options;
        assert_eq!(options.get("voice").map(String::as_str), Some("Brian"));
        assert_eq!(options.get("language").map(String::as_str), Some("en"));
        assert_eq!(options.get("rate").map(String::as_str), Some("2"));
        assert!(!options.contains_key("options"));
    }

    #[test]
    fn test_top_level_option_overrides_nested_one() {
        let segments = parse("[{tts: 'Hello', voice: 'Amy', options: {voice: 'Brian'}}]");
        assert_eq!(segments[0].options.get("voice").map(String::as_str), Some("Amy"));
    }

    #[test]
    fn test_keys_are_lowercased_and_aliases_renamed() {
        let segments = parse("[{TTS: 'Hello', Speed: 150, PITCH: -2, Language: 'en-GB'}]");
        assert_eq!(segments.len(), 1);
        let segment = &segments[0];
        assert_eq!(segment.speed, Some(150.0));
        assert_eq!(segment.pitch, Some(-2.0));
        assert_eq!(segment.options.get("language").map(String::as_str), Some("en-GB"));
    }

    #[test]
    fn test_long_form_speed_keys_are_kept() {
        let segments = parse("[{type: tts, message: 'Hi', tts_speed: 75, tts_pitch: 3}]");
        assert_eq!(segments[0].speed, Some(75.0));
        assert_eq!(segments[0].pitch, Some(3.0));
    }

    #[test]
    fn test_escaped_quotes_are_restored() {
        let segments = parse(r"[{tts: 'It\'s raining'}, {chime: 'rock\'n\'roll.mp3'}]");
        assert_eq!(
            segments,
            vec![Segment::tts("It's raining"), Segment::chime("rock'n'roll.mp3")]
        );
    }

    #[test]
    fn test_segment_offset_override() {
        let segments = parse("[{chime: 'bell'}, {tts: 'Hello', offset: -250}]");
        assert_eq!(segments[1].offset_ms, Some(-250.0));
    }

    #[test]
    fn test_niqqud_is_removed() {
        assert_eq!(remove_niqqud("שָׁלוֹם"), "שלום");
        assert_eq!(parse("שָׁלוֹם"), vec![Segment::tts("שלום")]);
    }

    #[test]
    fn test_reparsing_long_form_output_is_stable() {
        let inputs = [
            "[{chime: 'bell.mp3'}, {tts: 'Hello', speed: 120}, {delay: 500}]",
            "[{tts: 'Three', repeat: 3, voice: 'Brian'}]",
            "Just a sentence",
        ];
        for raw in inputs {
            let first = parse(raw);
            let yaml = segments_to_yaml(&first).unwrap();
            let second = parse(&yaml);
            assert_eq!(first, second, "re-parse of {raw:?} via {yaml:?}");
        }
    }
}
