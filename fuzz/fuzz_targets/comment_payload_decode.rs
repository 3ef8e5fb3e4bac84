#![no_main]

use libfuzzer_sys::fuzz_target;
use subbot_reddit::{is_comment_fullname, Comment};

fuzz_target!(|data: &[u8]| {
    if let Ok(comment) = Comment::from_feed_payload(data) {
        let _ = comment.is_deleted();
        assert_eq!(
            comment.has_comment_parent(),
            is_comment_fullname(&comment.parent_id)
        );
    }
});
