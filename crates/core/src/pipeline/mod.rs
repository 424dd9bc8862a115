pub mod blur_frame_use_case;
