pub mod cpu_frame_cropper;
